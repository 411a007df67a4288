// Captcha vocabulary and option drawing.

use super::moderation_models::CaptchaOption;
use crate::core::i18n::Language;
use rand::seq::SliceRandom;
use rand::Rng;

pub const OPTIONS_PER_PROMPT: usize = 3;
const TOKEN_PREFIX: &str = "gk";

struct VocabularyEntry {
    glyph: &'static str,
    en: &'static str,
    ru: &'static str,
}

const VOCABULARY: &[VocabularyEntry] = &[
    VocabularyEntry { glyph: "🐩", en: "the poodle", ru: "пуделя" },
    VocabularyEntry { glyph: "🐿️", en: "the squirrel", ru: "белку" },
    VocabularyEntry { glyph: "🐓", en: "the rooster", ru: "петуха" },
    VocabularyEntry { glyph: "🐷", en: "the pig", ru: "свинью" },
    VocabularyEntry { glyph: "🍆", en: "the eggplant", ru: "баклажан" },
    VocabularyEntry { glyph: "🎂", en: "the cake", ru: "торт" },
    VocabularyEntry { glyph: "🍔", en: "the burger", ru: "бургер" },
    VocabularyEntry { glyph: "🔪", en: "the knife", ru: "нож" },
    VocabularyEntry { glyph: "📱", en: "the phone", ru: "телефон" },
    VocabularyEntry { glyph: "🎁", en: "the gift", ru: "подарок" },
    VocabularyEntry { glyph: "🖥️", en: "the computer", ru: "компьютер" },
    VocabularyEntry { glyph: "💡", en: "the light bulb", ru: "лампочку" },
    VocabularyEntry { glyph: "🥁", en: "the drum", ru: "барабан" },
    VocabularyEntry { glyph: "🎸", en: "the guitar", ru: "гитару" },
    VocabularyEntry { glyph: "❤️", en: "the heart", ru: "сердце" },
    VocabularyEntry { glyph: "🧦", en: "the socks", ru: "носки" },
    VocabularyEntry { glyph: "🌭", en: "the hot dog", ru: "хот-дог" },
    VocabularyEntry { glyph: "🍌", en: "the banana", ru: "банан" },
    VocabularyEntry { glyph: "🍎", en: "the apple", ru: "яблоко" },
    VocabularyEntry { glyph: "🐐", en: "the goat", ru: "козла" },
    VocabularyEntry { glyph: "💺💺", en: "the two chairs", ru: "два стула" },
];

/// Three distinct options, one of them correct.
#[derive(Debug, Clone)]
pub struct CaptchaDraw {
    pub options: Vec<CaptchaOption>,
    pub correct: usize,
}

impl CaptchaDraw {
    pub fn correct_option(&self) -> &CaptchaOption {
        &self.options[self.correct]
    }
}

/// Draw options without replacement and pick the correct one uniformly.
pub fn draw_captcha<R: Rng + ?Sized>(rng: &mut R, lang: Language) -> CaptchaDraw {
    let options = VOCABULARY
        .choose_multiple(rng, OPTIONS_PER_PROMPT)
        .map(|entry| CaptchaOption {
            glyph: entry.glyph.to_string(),
            label: match lang {
                Language::En => entry.en,
                Language::Ru => entry.ru,
            }
            .to_string(),
        })
        .collect();

    CaptchaDraw {
        options,
        correct: rng.gen_range(0..OPTIONS_PER_PROMPT),
    }
}

/// Random hex identifier for batches and option nonces.
pub fn random_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:016x}", rng.gen::<u64>())
}

pub fn answer_token(batch_id: &str, nonce: &str) -> String {
    format!("{}:{}:{}", TOKEN_PREFIX, batch_id, nonce)
}

/// Split a token into `(batch id, nonce)`.
pub fn parse_answer_token(token: &str) -> Option<(&str, &str)> {
    let mut parts = token.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(TOKEN_PREFIX), Some(batch), Some(nonce)) if !batch.is_empty() && !nonce.is_empty() => {
            Some((batch, nonce))
        }
        _ => None,
    }
}

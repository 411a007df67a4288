// Static phrase table for user-facing text.
//
// Only `en` and `ru` are shipped. Unknown language tags fall back to `en`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Ru,
}

impl Language {
    /// Parse a language tag such as `en`, `ru` or `ru-RU`.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "ru" => Language::Ru,
            _ => Language::En,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
        }
    }

    pub fn is_supported(tag: &str) -> bool {
        matches!(tag.to_ascii_lowercase().as_str(), "en" | "ru")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrase {
    /// Placeholders: `{names}`, `{label}`
    ChallengeGreeting,
    /// Placeholder: `{name}`
    CannotDeleteOrBan,
    CannotDelete,
    CannotBan,
    NeedPermissions,
    AnswerAccepted,
    AnswerIncorrect,
    AnswerNotChallenged,
    AnswerExpired,
}

pub fn translate(phrase: Phrase, lang: Language) -> &'static str {
    use Language::*;
    use Phrase::*;

    match (phrase, lang) {
        (ChallengeGreeting, En) => "Hi, {names}! To say hello, press {label} :)",
        (ChallengeGreeting, Ru) => "Привет, {names}! В качестве приветствия нажми на {label} :)",

        (CannotDeleteOrBan, En) => "I can't delete messages or ban spammer \"{name}\".",
        (CannotDeleteOrBan, Ru) => "Я не могу удалять сообщения или банить спамера \"{name}\".",

        (CannotDelete, En) => "I can't delete messages from spammer \"{name}\".",
        (CannotDelete, Ru) => "Я не могу удалять сообщения спамера \"{name}\".",

        (CannotBan, En) => "I can't ban spammer \"{name}\".",
        (CannotBan, Ru) => "Я не могу забанить спамера \"{name}\".",

        (NeedPermissions, En) => "I should have the permissions to ban and delete messages here.",
        (NeedPermissions, Ru) => "Мне нужны права на бан и удаление сообщений в этом чате.",

        (AnswerAccepted, En) => "Welcome aboard!",
        (AnswerAccepted, Ru) => "Добро пожаловать!",

        (AnswerIncorrect, En) => "That's not it, try again.",
        (AnswerIncorrect, Ru) => "Не то, попробуй ещё раз.",

        (AnswerNotChallenged, En) => "This button isn't for you.",
        (AnswerNotChallenged, Ru) => "Эта кнопка не для тебя.",

        (AnswerExpired, En) => "This challenge has already ended.",
        (AnswerExpired, Ru) => "Эта проверка уже закончилась.",
    }
}

/// Translate and substitute `{key}` placeholders.
pub fn render(phrase: Phrase, lang: Language, args: &[(&str, &str)]) -> String {
    args.iter()
        .fold(translate(phrase, lang).to_string(), |text, (key, value)| {
            text.replace(&format!("{{{}}}", key), value)
        })
}

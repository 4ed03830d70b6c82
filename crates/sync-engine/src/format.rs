//! Text rendering for CRM-visible annotations.

/// Separator between the original and the edited text.
pub const EDIT_SEPARATOR: &str = "│✏️edited\n-----\n";

/// Quoted originals longer than this are shortened.
const QUOTE_MAX_CHARS: usize = 280;

/// Language of CRM annotations, from the tenant setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Pt,
    En,
    Es,
}

impl Language {
    /// Parse a tenant language code. Unknown codes fall back to Portuguese.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().split(['-', '_']).next() {
            Some("en") => Language::En,
            Some("es") => Language::Es,
            _ => Language::Pt,
        }
    }
}

/// Follow-up message for an edit made on WhatsApp.
pub fn edit_annotation(original: &str, edited: &str) -> String {
    format!("{original}{EDIT_SEPARATOR}{edited}")
}

/// Header prepended to group messages.
pub fn group_header(member_phone: &str, member_name: &str) -> String {
    format!("({member_phone})-👤[ {member_name} ]:")
}

fn shorten(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= QUOTE_MAX_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(QUOTE_MAX_CHARS).collect();
    format!("{cut}…")
}

/// "Replying to" block placed above a reply.
pub fn reply_context(lang: Language, original: &str) -> String {
    let label = match lang {
        Language::Pt => "Respondendo a",
        Language::En => "Replying to",
        Language::Es => "Respondiendo a",
    };
    format!("↩️ {label}: '{}'\n-----\n", shorten(original))
}

/// Internal note for a deleted message.
pub fn deleted_note(lang: Language, original: &str) -> String {
    let label = match lang {
        Language::Pt => "Mensagem apagada",
        Language::En => "Message deleted",
        Language::Es => "Mensaje eliminado",
    };
    format!("🗑️ {label}: '{}'", shorten(original))
}

/// Internal note for an instance switch.
pub fn switch_note(lang: Language, previous: &str, next: &str) -> String {
    let label = match lang {
        Language::Pt => "Conversa transferida",
        Language::En => "Conversation switched",
        Language::Es => "Conversación transferida",
    };
    format!("🔄 {label}: {previous} → {next}")
}

/// Tag text for the connected number, e.g. `+55 11 91111-2222`.
pub fn phone_tag(digits: &str) -> String {
    match digits.len() {
        12 | 13 if digits.starts_with("55") => {
            let (country, rest) = digits.split_at(2);
            let (area, local) = rest.split_at(2);
            let (head, tail) = local.split_at(local.len() - 4);
            format!("+{country} {area} {head}-{tail}")
        }
        _ => format!("+{digits}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_annotation_format() {
        assert_eq!(edit_annotation("old", "new"), "old│✏️edited\n-----\nnew");
    }

    #[test]
    fn test_group_header_format() {
        assert_eq!(group_header("5511988887777", "Ana"), "(5511988887777)-👤[ Ana ]:");
    }

    #[test]
    fn test_reply_context_localized() {
        assert!(reply_context(Language::En, "hi").starts_with("↩️ Replying to: 'hi'"));
        assert!(reply_context(Language::Pt, "oi").contains("Respondendo a"));
        assert!(reply_context(Language::from_code("es-MX"), "hola").contains("Respondiendo a"));
    }

    #[test]
    fn test_long_quote_is_shortened() {
        let long = "a".repeat(400);
        let rendered = reply_context(Language::En, &long);
        assert!(rendered.contains('…'));
        assert!(rendered.chars().count() < 320);
    }

    #[test]
    fn test_language_fallback() {
        assert_eq!(Language::from_code("fr"), Language::Pt);
        assert_eq!(Language::from_code("EN"), Language::En);
    }

    #[test]
    fn test_phone_tag() {
        assert_eq!(phone_tag("5511911112222"), "+55 11 91111-2222");
        assert_eq!(phone_tag("551133334444"), "+55 11 3333-4444");
        assert_eq!(phone_tag("14155550100"), "+14155550100");
    }
}

//! Fixed per-language strings: participant names, the context preamble, and
//! the details a UI shell renders.

use serde::{Deserialize, Serialize};

use super::models::ChatDetails;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    /// Parse a language code such as `EN` or `es`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "EN" => Some(Locale::En),
            "ES" => Some(Locale::Es),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "EN",
            Locale::Es => "ES",
        }
    }

    pub fn human_name(self) -> &'static str {
        match self {
            Locale::En => "User",
            Locale::Es => "Usuario",
        }
    }

    pub fn bot_name(self) -> &'static str {
        match self {
            Locale::En => "Assistant",
            Locale::Es => "Asistente",
        }
    }

    /// Preamble placed before the first turn of every prompt.
    pub fn context(self) -> String {
        let (human, bot) = (self.human_name(), self.bot_name());
        match self {
            Locale::En => format!(
                "The following is a friendly conversation between {human} and {bot} in English."
            ),
            Locale::Es => format!(
                "El siguiente texto es una conversación amistosa entre {human} y {bot} en español."
            ),
        }
    }

    pub fn details(self) -> ChatDetails {
        match self {
            Locale::En => ChatDetails {
                title: "Phi-2 Chat".to_string(),
                description: "Chat with a small causal language model. Answers are streamed \
                              while they are generated."
                    .to_string(),
                examples: vec![
                    "Hello! How are you today?".to_string(),
                    "Can you explain what a language model is?".to_string(),
                    "Write a short poem about the sea.".to_string(),
                ],
            },
            Locale::Es => ChatDetails {
                title: "Chat con Phi-2".to_string(),
                description: "Conversa con un modelo de lenguaje causal pequeño. Las respuestas \
                              se muestran mientras se generan."
                    .to_string(),
                examples: vec![
                    "¡Hola! ¿Cómo estás hoy?".to_string(),
                    "¿Puedes explicar qué es un modelo de lenguaje?".to_string(),
                    "Escribe un poema corto sobre el mar.".to_string(),
                ],
            },
        }
    }
}

/// Names and preamble resolved once from the configured locale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Persona {
    pub human_name: String,
    pub bot_name: String,
    pub context: String,
}

impl From<Locale> for Persona {
    fn from(locale: Locale) -> Self {
        Self {
            human_name: locale.human_name().to_string(),
            bot_name: locale.bot_name().to_string(),
            context: locale.context(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_is_case_insensitive() {
        assert_eq!(Locale::from_code("en"), Some(Locale::En));
        assert_eq!(Locale::from_code(" ES "), Some(Locale::Es));
        assert_eq!(Locale::from_code("fr"), None);
    }

    #[test]
    fn test_context_mentions_both_names() {
        for locale in [Locale::En, Locale::Es] {
            let context = locale.context();
            assert!(context.contains(locale.human_name()));
            assert!(context.contains(locale.bot_name()));
        }
    }

    #[test]
    fn test_spanish_persona() {
        let persona = Persona::from(Locale::Es);
        assert_eq!(persona.human_name, "Usuario");
        assert_eq!(persona.bot_name, "Asistente");
        assert!(persona.context.starts_with("El siguiente texto"));
    }

    #[test]
    fn test_details_have_examples() {
        assert_eq!(Locale::En.details().examples.len(), 3);
        assert_eq!(Locale::Es.details().title, "Chat con Phi-2");
    }
}

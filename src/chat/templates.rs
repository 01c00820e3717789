use crate::locale::Persona;
use crate::models::Turn;

/// Build the linear prompt for a plain "Name: text" transcript.
///
/// Every turn contributes a human line and a bot line, in history order; the
/// bot line is emitted even when empty so the prompt ends with the bot's name
/// and a colon, inviting the model to answer. The transcript is trimmed and
/// placed on the line after the context preamble.
pub fn build_prompt(persona: &Persona, turns: &[Turn]) -> String {
    let mut transcript = String::new();
    for turn in turns {
        transcript.push('\n');
        transcript.push_str(&persona.human_name);
        transcript.push_str(": ");
        transcript.push_str(&turn.human);
        transcript.push('\n');
        transcript.push_str(&persona.bot_name);
        transcript.push_str(": ");
        transcript.push_str(&turn.bot);
    }

    format!("{}\n{}", persona.context, transcript.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;

    fn persona() -> Persona {
        Persona::from(Locale::En)
    }

    fn count_segments(prompt: &str, persona: &Persona) -> usize {
        let human = format!("{}: ", persona.human_name);
        let bot = format!("{}:", persona.bot_name);
        prompt
            .lines()
            .skip(1)
            .filter(|line| line.starts_with(&human) || line.starts_with(&bot))
            .count()
    }

    #[test]
    fn test_single_pending_turn() {
        let persona = persona();
        let prompt = build_prompt(&persona, &[Turn::pending("Hi")]);
        assert_eq!(
            prompt,
            format!("{}\nUser: Hi\nAssistant:", persona.context)
        );
    }

    #[test]
    fn test_history_order_and_segment_count() {
        let persona = persona();
        let turns = vec![
            Turn::new("first question", "first answer"),
            Turn::new("second question", "second answer"),
            Turn::pending("third question"),
        ];
        let prompt = build_prompt(&persona, &turns);

        assert!(prompt.starts_with(&persona.context));
        assert_eq!(count_segments(&prompt, &persona), 2 * turns.len());

        let positions: Vec<usize> = [
            "first question",
            "first answer",
            "second question",
            "second answer",
            "third question",
        ]
        .iter()
        .map(|needle| prompt.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_bot_lines_are_kept() {
        let persona = persona();
        let turns = vec![Turn::new("hello", ""), Turn::pending("anyone?")];
        let prompt = build_prompt(&persona, &turns);
        assert!(prompt.contains("\nUser: hello\nAssistant: \nUser: anyone?"));
        assert!(prompt.ends_with("\nAssistant:"));
    }

    #[test]
    fn test_transcript_whitespace_is_trimmed() {
        let persona = persona();
        let prompt = build_prompt(&persona, &[Turn::pending("  padded  ")]);
        // Leading newline of the first segment is trimmed, the inner padding is not.
        assert!(prompt.contains("\nUser:   padded  \nAssistant:"));
        assert!(!prompt.contains("\n\n"));
    }

    #[test]
    fn test_empty_turn_list_yields_context_line() {
        let persona = persona();
        assert_eq!(build_prompt(&persona, &[]), format!("{}\n", persona.context));
    }

    #[test]
    fn test_spanish_names() {
        let persona = Persona::from(Locale::Es);
        let prompt = build_prompt(&persona, &[Turn::pending("Hola")]);
        assert!(prompt.ends_with("\nUsuario: Hola\nAsistente:"));
    }
}

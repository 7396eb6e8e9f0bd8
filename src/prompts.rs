//! Prompt text for the rewording completion call.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing how regions are reworded
//!    requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the assembled prompt without
//!    calling a real completion endpoint.

/// Build the user prompt asking the model to reword extracted content as
/// readable English.
///
/// The plain text passed in has already been through the deterministic
/// LaTeX-to-text transform, so the model only has to smooth symbols and
/// phrasing into something pleasant to hear read aloud.
pub fn reword_prompt(plain_text: &str) -> String {
    format!(
        "Convert the following plain text content to readable English:\n\n{plain_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_the_text() {
        let p = reword_prompt("x squared plus y squared");
        assert!(p.contains("x squared plus y squared"));
        assert!(p.starts_with("Convert the following"));
    }
}

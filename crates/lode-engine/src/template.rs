/// ChatML prompt assembly.
///
/// An empty system prompt means the caller wants raw completion: the user
/// text goes to the model untouched. A non-empty system prompt wraps both
/// turns in ChatML rails and opens the assistant turn.
pub fn render_prompt(prompt: &str, system_prompt: &str) -> String {
    if system_prompt.is_empty() {
        return prompt.to_string();
    }
    format!(
        "<|im_start|>system\n{system_prompt}<|im_end|>\n\
         <|im_start|>user\n{prompt}<|im_end|>\n\
         <|im_start|>assistant\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_system_prompt_is_raw() {
        assert_eq!(render_prompt("2 + 2 =", ""), "2 + 2 =");
    }

    #[test]
    fn system_prompt_wraps_in_chatml() {
        let rendered = render_prompt("hi", "be brief");
        assert!(rendered.starts_with("<|im_start|>system\nbe brief<|im_end|>\n"));
        assert!(rendered.contains("<|im_start|>user\nhi<|im_end|>\n"));
        assert!(rendered.ends_with("<|im_start|>assistant\n"));
    }
}

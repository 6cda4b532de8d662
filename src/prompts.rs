/// Split free text into prompts separated by blank lines.
///
/// Lines inside a prompt keep their line breaks; surrounding whitespace is
/// trimmed and empty prompts are dropped.
pub fn split_prompts(text: &str) -> Vec<String> {
    let mut prompts = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut prompts);
        } else {
            current.push(line);
        }
    }
    flush(&mut current, &mut prompts);
    prompts
}

fn flush(current: &mut Vec<&str>, prompts: &mut Vec<String>) {
    let prompt = current.join("\n").trim().to_string();
    if !prompt.is_empty() {
        prompts.push(prompt);
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_blank_lines() {
        let text = "a cat on a skateboard\n\nrain over Seoul\nat night\n\n\n  \nlast one  ";
        assert_eq!(
            split_prompts(text),
            ["a cat on a skateboard", "rain over Seoul\nat night", "last one"]
        );
    }

    #[test]
    fn whitespace_only_lines_separate_prompts() {
        assert_eq!(split_prompts("one\n \t \ntwo"), ["one", "two"]);
    }

    #[test]
    fn windows_line_endings() {
        assert_eq!(split_prompts("one\r\n\r\ntwo\r\n"), ["one", "two"]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split_prompts("").is_empty());
        assert!(split_prompts("\n\n   \n").is_empty());
    }
}

//! Prompt templates for the three completion calls of a run

use crate::history::AttemptHistory;

const PLAIN_TEXT_RULES: &str = "Return only the code, do NOT explain yourself. \
Return the result in plain text and NOT markdown.";

const EXAMPLE_INSTRUCTIONS: &str = "Write a simple JavaScript program that counts \
the words in a sentence and prints the result.";

const EXAMPLE_CODE: &str = r#"const countWords = (sentence) =>
  sentence.split(/\s+/).filter((word) => word.length > 0).length;

console.log('Word count:', countWords('the quick brown fox'));"#;

/// First code for an instruction.
pub fn generate(instructions: &str) -> String {
    format!(
        "[INSTRUCTIONS]: You are an expert software developer. Write JavaScript code \
         based on the following instructions. Use well known npm packages to make the \
         task easier. ES module import syntax is preferred. {rules}\n\n\
         INSTRUCTIONS: {example_instructions}\n\n\
         CODE:\n{example_code}\n\n\
         [INSTRUCTIONS]: {instructions}\n\n\
         CODE:\n",
        rules = PLAIN_TEXT_RULES,
        example_instructions = EXAMPLE_INSTRUCTIONS,
        example_code = EXAMPLE_CODE,
        instructions = instructions,
    )
}

/// Rewrite of the current attempt, with every earlier attempt as commentary.
pub fn regenerate(instructions: &str, history: &AttemptHistory, code: &str, error: &str) -> String {
    let previous = history.render_commentary();
    let previous_section = if previous.is_empty() {
        String::new()
    } else {
        format!("PREVIOUS ATTEMPTS (oldest first):\n{}", previous)
    };

    format!(
        "Rewrite the following original code based on the user instructions, the \
         original code, and the error. Rewrite the code to fix any errors and pass any \
         provided tests. Leave a comment in the code for what you did to fix the issues. \
         {rules}\n\n\
         INSTRUCTIONS:\n{instructions}\n\n\
         {previous_section}\
         ORIGINAL CODE:\n{code}\n\n\
         ERROR:\n{error}\n\n\
         NEW ERROR FREE CODE:\n",
        rules = PLAIN_TEXT_RULES,
    )
}

/// Self-contained test harness for the current code.
pub fn test_harness(instructions: &str, code: &str) -> String {
    format!(
        "Write a JavaScript test case in vanilla JavaScript for the following code based \
         on the user instructions. The test will be appended to the code and run in the \
         same file. For each test case print the test case number and its status, \
         exactly `Test N: Pass` or `Test N: Fail`. {rules}\n\n\
         INSTRUCTIONS:\n{instructions}\n\n\
         CODE:\n{code}\n\n\
         TEST CODE:\n",
        rules = PLAIN_TEXT_RULES,
    )
}

/// Error context for a failed test run.
pub fn test_failure_context(harness: &str, output: &str) -> String {
    format!("TEST CODE:\n{}\n\nTEST OUTPUT:\n{}", harness, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_contains_instructions() {
        let prompt = generate("add two numbers");
        assert!(prompt.contains("[INSTRUCTIONS]: add two numbers"));
        assert!(prompt.ends_with("CODE:\n"));
    }

    #[test]
    fn test_regenerate_orders_sections() {
        let mut history = AttemptHistory::new();
        history.push("first()");
        history.fail_current("first error");
        history.push("second()");
        history.fail_current("second error");

        let prompt = regenerate("add two numbers", &history, "second()", "second error");

        let previous = prompt.find("// Previous Code 1:").unwrap();
        let original = prompt.find("ORIGINAL CODE:\nsecond()").unwrap();
        let error = prompt.find("ERROR:\nsecond error").unwrap();
        assert!(previous < original && original < error);
        assert!(prompt.contains("// first()"));
        assert!(prompt.contains("// first error"));
    }

    #[test]
    fn test_regenerate_without_history_has_no_previous_section() {
        let mut history = AttemptHistory::new();
        history.push("only()");
        let prompt = regenerate("x", &history, "only()", "boom");
        assert!(!prompt.contains("PREVIOUS ATTEMPTS"));
    }

    #[test]
    fn test_harness_prompt() {
        let prompt = test_harness("add two numbers", "const add = (a, b) => a + b;");
        assert!(prompt.contains("const add = (a, b) => a + b;"));
        assert!(prompt.contains("Test N: Fail"));
        assert!(prompt.ends_with("TEST CODE:\n"));
    }

    #[test]
    fn test_failure_context_block() {
        let ctx = test_failure_context("check()", "Test 1: Fail");
        assert_eq!(ctx, "TEST CODE:\ncheck()\n\nTEST OUTPUT:\nTest 1: Fail");
    }
}

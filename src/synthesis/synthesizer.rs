//! Generation of candidate tasks from seed pairs.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::config::SynthesisConfig;
use super::prompts::generation_prompt;
use super::task::ShellTask;
use crate::error::{LlmError, SynthesisError};
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::utils::attempt;

static TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)#Task Description#:(.*?)#Setup Commands#")
        .expect("Invalid regex for task description")
});

static SETUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)#Setup Commands#:(.*?)#Success Condition#")
        .expect("Invalid regex for setup commands")
});

static SUCCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)#Success Condition#:(.*)$").expect("Invalid regex for success condition")
});

/// First capture group of `re` in `text`, trimmed; `None` when absent or empty.
pub(crate) fn extract_field(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse the generator's structured reply into a task.
pub fn parse_generated_task(text: &str, difficulty: u32) -> Result<ShellTask, SynthesisError> {
    let task = extract_field(&TASK_RE, text);
    let setup_commands = extract_field(&SETUP_RE, text);
    let success_condition = extract_field(&SUCCESS_RE, text);

    match (task, setup_commands, success_condition) {
        (Some(task), Some(setup_commands), Some(success_condition)) => Ok(ShellTask {
            task,
            setup_commands,
            success_condition,
            difficulty_level: difficulty,
        }),
        (task, setup, success) => {
            let missing: Vec<&str> = [
                ("task description", task.is_none()),
                ("setup commands", setup.is_none()),
                ("success condition", success.is_none()),
            ]
            .into_iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| name)
            .collect();
            Err(SynthesisError::Parse(format!(
                "Failed to parse task from response: missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// Generates new candidate tasks inspired by two seed tasks.
pub struct TaskSynthesizer {
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_attempts: u32,
}

impl TaskSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &SynthesisConfig) -> Self {
        Self {
            llm,
            model: config.model.clone(),
            temperature: config.generation_temperature,
            max_attempts: config.llm_attempts,
        }
    }

    /// Generate one candidate, retrying generation and parsing together.
    pub async fn generate(
        &self,
        seed_a: &ShellTask,
        seed_b: &ShellTask,
        difficulty: u32,
    ) -> Result<ShellTask, SynthesisError> {
        let prompt = generation_prompt(seed_a, seed_b);

        attempt(self.max_attempts, "Task generation", move |_| {
            let request = GenerationRequest::new(self.model.clone(), vec![Message::user(prompt.clone())])
                .with_temperature(self.temperature);
            async move {
                let response = self.llm.generate(request).await?;
                let content = response.first_content().ok_or(LlmError::EmptyResponse)?;
                parse_generated_task(content, difficulty)
            }
        })
        .await
        .map_err(|e| SynthesisError::Exhausted {
            attempts: e.attempts,
            source: Box::new(e.last),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedLlm};

    const REPLY: &str = "- Step 1: #Common Elements List#\nfiles\n- Step 2: #Plan#\nmake logs\n- Step 3: #Task Description#: Compress every .log file in /var/app.\n  #Setup Commands#: mkdir -p /var/app; touch /var/app/a.log\n  #Success Condition#: test -f /var/app/a.log.gz\n";

    fn seed(task: &str) -> ShellTask {
        ShellTask {
            task: task.to_string(),
            setup_commands: "mkdir /x".to_string(),
            success_condition: "test -d /y".to_string(),
            difficulty_level: 2,
        }
    }

    #[test]
    fn test_parse_well_formed_reply() {
        let task = parse_generated_task(REPLY, 2).expect("parse");
        assert_eq!(task.task, "Compress every .log file in /var/app.");
        assert_eq!(task.setup_commands, "mkdir -p /var/app; touch /var/app/a.log");
        assert_eq!(task.success_condition, "test -f /var/app/a.log.gz");
        assert_eq!(task.difficulty_level, 2);
    }

    #[test]
    fn test_parse_multiline_fields() {
        let text = "#Task Description#: line one\nline two\n#Setup Commands#: a;\nb\n#Success Condition#: [ -f /x ]\n&& true";
        let task = parse_generated_task(text, 1).expect("parse");
        assert_eq!(task.task, "line one\nline two");
        assert_eq!(task.success_condition, "[ -f /x ]\n&& true");
    }

    #[test]
    fn test_parse_rejects_missing_or_empty_fields() {
        let err = parse_generated_task("#Task Description#: x\n#Setup Commands#: y\n", 1).unwrap_err();
        match err {
            SynthesisError::Parse(msg) => assert!(msg.contains("success condition")),
            other => panic!("unexpected error: {other}"),
        }

        let empty = "#Task Description#:   \n#Setup Commands#: y\n#Success Condition#: z";
        assert!(matches!(parse_generated_task(empty, 1), Err(SynthesisError::Parse(_))));
    }

    #[tokio::test]
    async fn test_generate_retries_until_parse_succeeds() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::Content("I cannot follow that format.".to_string()),
            Reply::Empty,
            Reply::Content(REPLY.to_string()),
        ]));
        let synthesizer = TaskSynthesizer::new(llm.clone(), &SynthesisConfig::default());
        let task = synthesizer
            .generate(&seed("A"), &seed("B"), 3)
            .await
            .expect("generate");

        assert_eq!(task.difficulty_level, 3);
        assert_eq!(llm.calls(), 3);
        let request = &llm.requests()[0];
        assert_eq!(request.temperature, Some(1.0));
        assert!(request.messages[0].content.contains("Seed Task 2:\nTask Description: B"));
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_three_attempts() {
        let llm = Arc::new(ScriptedLlm::always("no markers here"));
        let synthesizer = TaskSynthesizer::new(llm.clone(), &SynthesisConfig::default());
        let err = synthesizer
            .generate(&seed("A"), &seed("B"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, SynthesisError::Exhausted { attempts: 3, .. }));
        assert_eq!(llm.calls(), 3);
    }
}

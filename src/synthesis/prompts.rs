//! Prompt templates for task generation and solving.

use super::task::ShellTask;

/// History shown to the solver before any command ran.
pub const INITIAL_HISTORY: &str = "First turn, no history available yet.";

const GENERATION_TEMPLATE: &str = r#"You are a shell task generator assistant. Your goal is to create a novel and challenging shell task for an Ubuntu-like sandbox environment.

Please follow the steps below to create a synthetic shell task.

Step 1: Carefully read Seed Task 1 and Seed Task 2. Identify and list all common elements between these tasks (e.g., types of operations, environment assumptions, verification style). If no common elements are found, list the main elements from each task.

Step 2: Develop a comprehensive plan based on the Common Elements List or Main Elements List from Step 1. This plan will guide the generation of a new synthetic shell task that is similar in quality and complexity to the original tasks, including a task description, setup commands, and success condition. Ensure:
   - The setup commands prepare the environment (e.g., create files/directories) and execute successfully.
   - The success condition is a single bash command that returns exit code 0 if the task is completed correctly and non-zero initially (before agent actions).
   - The task is novel, inspired by but not copying the seeds.

Step 3: Execute the plan step by step and provide the new synthetic task components.

Seed Task 1:
Task Description: {task_1}
Setup Commands: {setup_1}
Success Condition: {success_1}

Seed Task 2:
Task Description: {task_2}
Setup Commands: {setup_2}
Success Condition: {success_2}

Please reply strictly in the following format:
- Step 1: #Common Elements List#
- Step 2: #Plan#
- Step 3: #Task Description#: [description]
  #Setup Commands#: [setup commands, separated by semicolons]
  #Success Condition#: [success command]
"#;

const SOLVER_TEMPLATE: &str = r#"You are an expert Linux shell user. Your goal is to complete the given task step-by-step.
Given a task and the history of previous turns, provide your reasoning in a 'thought' process
and then provide the single, next shell command to execute as the 'command'.
Pay attention to the output of the previous commands. If it is an error, you should provide a
debugging command to fix the issue and complete the previous turn's goal.
The 'reasoning', while it can be as verbose as you want, should not include newline characters.
The 'command' should be a valid shell command to input in the terminal.
If the task is complete, the command should be exactly 'exit 0'.

TASK: {task}
SHELL HISTORY:
{history}

Please reply strictly in the following format:
  #Reasoning#: [reasoning]
  #Command#: [command]
"#;

/// Prompt asking the generator for a new task inspired by two seeds.
pub fn generation_prompt(seed_a: &ShellTask, seed_b: &ShellTask) -> String {
    GENERATION_TEMPLATE
        .replace("{task_1}", &seed_a.task)
        .replace("{setup_1}", &seed_a.setup_commands)
        .replace("{success_1}", &seed_a.success_condition)
        .replace("{task_2}", &seed_b.task)
        .replace("{setup_2}", &seed_b.setup_commands)
        .replace("{success_2}", &seed_b.success_condition)
}

/// Prompt asking the solver for its next command.
pub fn solver_prompt(task: &str, history: &str) -> String {
    SOLVER_TEMPLATE
        .replace("{task}", task)
        .replace("{history}", history)
}

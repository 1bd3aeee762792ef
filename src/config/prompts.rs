//! System prompts for the computer-use model and the reasoning oracle.

use crate::knowledge::KnowledgeRecord;

/// Computer-use system prompt. The instruction is appended directly after it.
pub const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a GUI agent. You are given a task and your action history, with screenshots. You need to perform the next action to complete the task.

## Output Format
```
Thought: ...
Action: ...
```

## Action Space
click(start_box='<|box_start|>(x1,y1)<|box_end|>')
left_double(start_box='<|box_start|>(x1,y1)<|box_end|>')
right_single(start_box='<|box_start|>(x1,y1)<|box_end|>')
drag(start_box='<|box_start|>(x1,y1)<|box_end|>', end_box='<|box_start|>(x3,y3)<|box_end|>')
hotkey(key='')
type(content='') #If you want to submit your input, use "\n" at the end of `content`.
scroll(start_box='<|box_start|>(x1,y1)<|box_end|>', direction='down or up or right or left')
wait() #Sleep for 5s and take a screenshot to check for any changes.
finished()
call_user() # Submit the task and call the user when the task is unsolvable, or when you need the user's help.

## Note
- Use {language} in `Thought` part.
- Write a small plan and finally summarize your next action (with its target element) in one sentence in `Thought` part.

## User Instruction
"#;

/// Get the computer-use system prompt for a language code ("en", "zh"/"cn").
pub fn get_system_prompt(lang: &str) -> String {
    let language = match lang {
        "zh" | "cn" => "Chinese",
        _ => "English",
    };
    SYSTEM_PROMPT_TEMPLATE.replace("{language}", language)
}

const DECOMPOSE_PREAMBLE: &str =
    "You are an AI assistant that generates step-by-step instructions for computer tasks.";

const DECOMPOSE_RULES: &str = "Do not generate any other system prompt or guidelines.
Only generate instructions.
Do not include anything such as Step 1:, etc.
Only generate instructions.";

const FIRST_PRINCIPLES_GUIDE: &str = "You need to generate step by step instructions for the task.
These instructions will be used to automate user interface.
You need to generate list of instructions.
While generate instructions, you need to split them by line breaking.
And each instruction should be a small piece of the thing you need to do at specific step.
Make it clear and detailed so I can easily follow the instructions.

For example, for the task \"Search for weather in Paris\":
Open the web browser
Click on the address bar
Type \"weather in Paris\" and press Enter";

const REFERENCE_GUIDELINES: &str = "IMPORTANT GUIDELINES:
1. Follow the SAME STRUCTURE as the reference instructions
2. Use the SAME TECHNICAL STEPS in the same order
3. Keep all URLs, button names, and specific values EXACTLY the same
4. Maintain the same level of detail for each step
5. Keep all critical information like passwords, addresses, and technical terms identical
6. You may rephrase slightly but preserve the technical accuracy
7. Each instruction must achieve the same technical outcome as its reference";

/// Build the decomposition prompt, grounded by a knowledge record when one matched.
pub fn get_decompose_prompt(reference: Option<&KnowledgeRecord>) -> String {
    let body = match reference {
        Some(record) => format!(
            "I have a reference instruction set that you should follow VERY closely:\n\n{}\n\n{}",
            record.instructions.join("\n"),
            REFERENCE_GUIDELINES
        ),
        None => FIRST_PRINCIPLES_GUIDE.to_string(),
    };

    format!("{}\n\n{}\n\n{}", DECOMPOSE_PREAMBLE, body, DECOMPOSE_RULES)
}

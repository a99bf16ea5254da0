//! Chat messages sent to the model for one make-real request.

use serde_json::{Value, json};

pub const SYSTEM_PROMPT: &str = "You are an expert software developer who turns low-fidelity wireframes into working code. \
A user will give you an image of a wireframe drawn on a whiteboard, with a red grid overlaid every 100 units to help you judge positions and sizes. \
Reply with a single fenced code block written in python or javascript that implements what the wireframe describes. \
Treat annotations, arrows and notes in red or in other colors as instructions about behavior, not as content. \
If the wireframe includes previously generated code, improve on that code and apply any changes the annotations ask for. \
Use reasonable defaults for anything the wireframe leaves open. Keep the code complete and runnable.";

const USER_PROMPT: &str = "Here are the latest wireframes. Please reply with a single code block containing the code.";

/// Build the system and user messages for one request.
///
/// The user message carries the board image first, then the text found on
/// the board (when any), then the code of each previously generated
/// code-editor shape in the selection.
pub fn build_messages(
    system_prompt: &str,
    image_data_url: &str,
    text: &str,
    previous_code: &[&str],
) -> Vec<Value> {
    let mut parts = vec![
        json!({
            "type": "image_url",
            "image_url": { "url": image_data_url, "detail": "high" }
        }),
        json!({ "type": "text", "text": USER_PROMPT }),
    ];

    if !text.trim().is_empty() {
        parts.push(json!({
            "type": "text",
            "text": format!("Here's a list of all the text that we found in the design. Use it as a reference if anything is hard to read in the image:\n{text}"),
        }));
    }

    for code in previous_code {
        parts.push(json!({
            "type": "text",
            "text": format!("The designs also included code that you generated before. Here's that code:\n{code}"),
        }));
    }

    vec![
        json!({ "role": "system", "content": system_prompt }),
        json!({ "role": "user", "content": parts }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_only() {
        let msgs = build_messages(SYSTEM_PROMPT, "data:image/png;base64,AAA", "  ", &[]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "system");
        let parts = msgs[1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "image_url");
        assert_eq!(parts[0]["image_url"]["url"], "data:image/png;base64,AAA");
    }

    #[test]
    fn test_text_and_previous_code() {
        let msgs = build_messages("sys", "data:,", "Login\nSubmit", &["print(1)", "print(2)"]);
        assert_eq!(msgs[0]["content"], "sys");
        let parts = msgs[1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 5);
        assert!(parts[2]["text"].as_str().unwrap().ends_with("Login\nSubmit"));
        assert!(parts[3]["text"].as_str().unwrap().ends_with("print(1)"));
        assert!(parts[4]["text"].as_str().unwrap().ends_with("print(2)"));
    }
}

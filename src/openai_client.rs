use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Builds the full prompt for a given task and sends it to the chat
/// completions endpoint. The caller supplies the anchor context inside
/// `prompt`; this module never consults the server clock, since relative
/// dates must be resolved against the client's reported moment.
pub async fn generate_openai_prompt(
    prompt: &str,
    prompt_type: &str,
    api_key: &str,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let full_prompt = match prompt_type {
        "extract" => format!(
            "You are the extraction stage of a calendar assistant.\n\
             Task: from the user's message, extract every event it describes.\n\
             For each event report the raw spans, do NOT resolve dates yourself:\n\
             - \"title\": a short meaningful title, scheduling words removed\n\
             - \"temporal\": the date/time words exactly as the user said them\n\
             - \"duration\": length in minutes if stated, else null\n\
             - \"location\": where it happens if stated, else null\n\
             For update or delete requests also report \"target\": the words\n\
             identifying the existing event (title words and any date words).\n\
             Rules:\n\
             - Keep the user's own wording in the spans; never invent values.\n\
             - Output ONLY raw JSON, no prose, markdown, or code fences.\n\
             - The JSON shape must be exactly:\n\
             {{\"action\":\"create|update|delete|query|none\",\"candidates\":[{{\"title\":\"...\",\"temporal\":\"...\",\"duration\":null,\"location\":null}}],\"target\":{{\"title\":\"...\",\"temporal\":\"...\"}}}}\n\
             (\"target\" may be null for create and query.)\n\
             {user_prompt}",
            user_prompt = prompt
        ),
        "extract_correction" => format!(
            "You are the correction stage of a calendar assistant.\n\
             Task: the user was shown a proposed calendar action and replied with\n\
             a correction note. Re-extract the event spans with the correction\n\
             applied. The note only fixes details; it is never event content.\n\
             Rules:\n\
             - Preserve the original spans unless the note explicitly changes them.\n\
             - Output ONLY raw JSON, no prose, markdown, or code fences.\n\
             - The JSON shape must be exactly:\n\
             {{\"action\":\"create|update|delete|query|none\",\"candidates\":[{{\"title\":\"...\",\"temporal\":\"...\",\"duration\":null,\"location\":null}}],\"target\":null}}\n\
             {user_prompt}",
            user_prompt = prompt
        ),
        _ => return Err("Not a valid base prompt".to_string().into()),
    };

    query_openai(full_prompt, api_key).await
}

async fn query_openai(
    prompt: String,
    api_key: &str,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let request: OpenAIRequest = OpenAIRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![
            OpenAIMessage {
                role: "system".to_string(),
                content: "You are a strict JSON extraction engine for a calendar assistant. You read instructions and a user message and reply ONLY with a single JSON value, with no markdown, no backticks, and no extra text. You keep the user's own words in extracted spans and never invent dates, titles, or locations.".to_string(),
            },
            OpenAIMessage {
                role: "user".to_string(),
                content: prompt,
            },
        ],
        max_tokens: 1500,
        temperature: 0.2,
    };

    let client = reqwest::Client::new();
    let response = client
        .post("https://api.openai.com/v1/chat/completions")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        tracing::error!(%status, body = %text, "chat completion request failed");
        return Err(format!("Request failed with status {}", status).into());
    }

    let parsed: OpenAIResponse = serde_json::from_str(&text)
        .map_err(|e| format!("Failed to parse JSON: {}\nRaw body: {}", e, text))?;

    if let Some(choice) = parsed.choices.first() {
        Ok(choice.message.content.clone())
    } else {
        tracing::error!(body = %text, "no choices in chat completion response");
        Err("No response from OpenAI".to_string().into())
    }
}

/// Context block prepended to extraction prompts so the model resolves
/// nothing against its own idea of "now".
pub fn anchor_block(current_datetime: &str, weekday: &str, days_in_month: u32) -> String {
    format!(
        "Current date and time: {current_datetime}\n\
         Weekday: {weekday}\n\
         Days in current month: {days_in_month}\n"
    )
}

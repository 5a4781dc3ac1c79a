// src/types/openai.rs

use serde::{Deserialize, Serialize};

use super::chat::Message;

#[derive(Serialize, Debug)]
pub struct OpenAIRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [OpenAIMessage],
    pub stream: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.author.role().to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct OpenAIStreamResponse {
    #[serde(default)]
    pub choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize, Debug)]
pub struct OpenAIStreamChoice {
    #[serde(default)]
    pub delta: OpenAIDelta,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct OpenAIDelta {
    pub content: Option<String>,
}

impl OpenAIStreamResponse {
    /// `choices[0].delta.content`, when present and non-empty.
    pub fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
    }
}

#[derive(Deserialize, Debug)]
pub struct OpenAIModelList {
    pub data: Option<Vec<OpenAIModel>>,
}

#[derive(Deserialize, Debug)]
pub struct OpenAIModel {
    pub id: String,
}

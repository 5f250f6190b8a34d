//! Recipe prompting and the line-oriented parser for model replies.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::call_log::CallLog;
use crate::error::Result;
use crate::generation::{ChatModel, Message};

const SYSTEM_PROMPT: &str = "You are a helpful cooking assistant that creates recipes based on available ingredients and dietary preferences. You also provide nutritional analysis and suggestions for modifications.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub nutrition: BTreeMap<String, String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeRequest {
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub dietary_preference: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Name,
    Ingredients,
    Instructions,
    Nutrition,
    Suggestions,
}

fn header_section(line: &str) -> Option<Section> {
    if line.contains("Recipe name") || line.starts_with("# ") {
        Some(Section::Name)
    } else if line.contains("Ingredients") {
        Some(Section::Ingredients)
    } else if line.contains("Instructions") || line.contains("Steps") {
        Some(Section::Instructions)
    } else if line.contains("Nutritional") {
        Some(Section::Nutrition)
    } else if line.contains("Suggestions") || line.contains("Modifications") {
        Some(Section::Suggestions)
    } else {
        None
    }
}

fn nutrition_key(line: &str, recorded: usize) -> String {
    let lower = line.to_lowercase();
    let key = if lower.contains("calories") {
        "calories"
    } else if lower.contains("protein") {
        "protein"
    } else if lower.contains("carbs") || lower.contains("carbohydrates") {
        "carbs"
    } else if lower.contains("fat") {
        "fat"
    } else {
        return format!("other_{}", recorded);
    };
    key.to_string()
}

/// Best-effort split of a free-form model reply into recipe fields.
///
/// Never fails: text that does not fit the expected layout just leaves fields
/// empty. Lines before the first recognised header are dropped.
pub fn parse_recipe(content: &str) -> Recipe {
    let mut recipe = Recipe::default();
    let mut section = None;

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(header) = header_section(line) {
            if header == Section::Name {
                recipe.name = line
                    .replace("Recipe name:", "")
                    .replace("# ", "")
                    .trim()
                    .to_string();
            }
            section = Some(header);
            continue;
        }

        match section {
            Some(Section::Ingredients) => recipe.ingredients.push(line.to_string()),
            Some(Section::Instructions) => recipe.instructions.push(line.to_string()),
            Some(Section::Suggestions) => recipe.suggestions.push(line.to_string()),
            Some(Section::Nutrition) => {
                let key = nutrition_key(line, recipe.nutrition.len());
                recipe.nutrition.insert(key, line.to_string());
            }
            Some(Section::Name) | None => {}
        }
    }

    recipe
}

pub fn build_prompt(request: &RecipeRequest) -> String {
    let mut prompt = format!(
        "Create a recipe using these ingredients: {}.",
        request.ingredients.join(", ")
    );
    if let Some(preference) = request.dietary_preference.as_deref().filter(|p| !p.is_empty()) {
        prompt.push_str(&format!(" The recipe should be {}.", preference));
    }
    if let Some(goal) = request.goal.as_deref().filter(|g| !g.is_empty()) {
        prompt.push_str(&format!(" The recipe should support {}.", goal));
    }
    prompt.push_str(" Please provide the following information:\n");
    prompt.push_str("1. Recipe name\n");
    prompt.push_str("2. Ingredients with quantities\n");
    prompt.push_str("3. Step-by-step cooking instructions\n");
    prompt.push_str("4. Nutritional information (calories, protein, carbs, fat)\n");
    prompt.push_str("5. Suggestions for modifications to better meet dietary preferences or goals\n");
    prompt
}

fn messages_for(request: &RecipeRequest) -> Vec<Message> {
    vec![Message::system(SYSTEM_PROMPT), Message::user(build_prompt(request))]
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecipeEvent {
    Chunk(String),
    Done(Recipe),
}

pub type RecipeStream = Pin<Box<dyn Stream<Item = Result<RecipeEvent>> + Send>>;

#[derive(Clone)]
pub struct RecipeGenerator {
    chat: Arc<dyn ChatModel>,
    log: Arc<CallLog>,
}

impl RecipeGenerator {
    pub fn new(chat: Arc<dyn ChatModel>, log: Arc<CallLog>) -> Self {
        Self { chat, log }
    }

    pub async fn generate(&self, request: &RecipeRequest) -> Result<Recipe> {
        let messages = messages_for(request);
        info!(
            "Generating recipe from {} ingredients",
            request.ingredients.len()
        );
        let content = self.chat.complete(&messages).await?;
        self.log
            .log_text_generation(serde_json::json!(messages), &content, self.chat.model())
            .await;
        Ok(parse_recipe(&content))
    }

    /// Text deltas as the model writes them, then the parsed recipe.
    pub fn generate_stream(&self, request: &RecipeRequest) -> RecipeStream {
        let messages = messages_for(request);
        let chat = Arc::clone(&self.chat);
        let log = Arc::clone(&self.log);

        Box::pin(try_stream! {
            let mut deltas = chat.complete_stream(&messages).await?;
            let mut full = String::new();
            while let Some(delta) = deltas.next().await {
                let delta = delta?;
                full.push_str(&delta);
                yield RecipeEvent::Chunk(delta);
            }
            log.log_text_generation(serde_json::json!(messages), &full, chat.model())
                .await;
            yield RecipeEvent::Done(parse_recipe(&full));
        })
    }
}

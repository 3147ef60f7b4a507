use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;

use crate::llm::GenerationParams;
use crate::prompt::{PromptTemplate, DEFAULT_WINDOW};
use crate::session::{ChatConfig, Mode};

#[derive(Subcommand, Debug, Clone)]
pub enum Model {
    /// Use an already downloaded model
    #[clap(name = "local")]
    Local {
        /// The path to the model. e.g. `./deepseek-coder-1.3b-instruct.Q8_0.gguf`
        path: PathBuf,
    },
    /// Download a model from huggingface (or use a cached version)
    #[clap(name = "hf-model")]
    HuggingFace {
        /// the repo containing the model. e.g. `TheBloke/deepseek-coder-1.3b-instruct-GGUF`
        repo: String,
        /// the model name. e.g. `deepseek-coder-1.3b-instruct.Q4_K_M.gguf`
        model: String,
    },
}

#[cfg(feature = "llama")]
impl Model {
    /// Convert the model to a path - may download from huggingface
    pub fn get_or_load(self) -> anyhow::Result<PathBuf> {
        use anyhow::Context;
        use hf_hub::api::sync::ApiBuilder;

        match self {
            Model::Local { path } => Ok(path),
            Model::HuggingFace { model, repo } => ApiBuilder::new()
                .with_progress(true)
                .build()
                .with_context(|| "unable to create huggingface api")?
                .model(repo)
                .get(&model)
                .with_context(|| "unable to download model"),
        }
    }
}

/// Prompt layout as named on the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// `User:` / `Assistant:` dialogue
    Chat,
    /// `### Instruction:` / `### Response:` blocks
    Instruct,
}

impl From<Template> for PromptTemplate {
    fn from(template: Template) -> Self {
        match template {
            Template::Chat => PromptTemplate::Chat,
            Template::Instruct => PromptTemplate::Instruct,
        }
    }
}

/// A model metadata override given as `KEY=VALUE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverrideValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rchat", about = "Chat with a local language model")]
pub struct Args {
    /// The path to the model
    #[command(subcommand)]
    pub model: Model,

    /// chat keeps a conversation history, completion sends each message as-is
    #[clap(value_enum, short = 'm', long, default_value = "chat")]
    pub mode: Mode,

    /// prompt layout used to replay the conversation
    #[clap(value_enum, short = 't', long, default_value = "chat")]
    pub template: Template,

    /// number of most recent turns sent back to the model
    #[clap(short = 'w', long, default_value_t = DEFAULT_WINDOW, conflicts_with = "full_history")]
    pub window: usize,

    /// send the whole conversation to the model instead of a window
    #[clap(long, action)]
    pub full_history: bool,

    /// maximum number of tokens generated per reply (capped at 512)
    #[clap(short = 'n', long, default_value_t = 256)]
    pub max_new_tokens: usize,

    /// sampling temperature
    #[clap(long, default_value_t = 0.2)]
    pub temperature: f32,

    /// nucleus sampling threshold
    #[clap(long, default_value_t = 0.95)]
    pub top_p: f32,

    /// penalty applied to recently generated tokens
    #[clap(long, default_value_t = 1.2)]
    pub repeat_penalty: f32,

    /// override some parameters of the model
    #[clap(short = 'o', value_parser = parse_key_val)]
    pub key_value_overrides: Vec<(String, OverrideValue)>,

    /// how many layers to keep on the gpu - zero is cpu mode
    #[clap(short = 'g', long, default_value_t = 0)]
    pub n_gpu_layers: u32,

    /// set the seed for the RNG
    #[clap(short = 's', long, default_value_t = 561371)]
    pub seed: u32,

    /// number of threads to use during generation
    #[clap(
        long,
        help = "number of threads to use during generation (default: use all available threads)"
    )]
    pub threads: Option<i32>,
    #[clap(
        long,
        help = "number of threads to use during batch and prompt processing (default: use all available threads)"
    )]
    pub threads_batch: Option<i32>,

    /// size of the prompt context
    #[clap(short = 'c', long, default_value = "2048")]
    pub ctx_size: NonZeroU32,

    /// log what is sent to and received from the model
    #[clap(short = 'v', long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            mode: self.mode,
            template: self.template.into(),
            window: (!self.full_history).then_some(self.window),
            generation: GenerationParams {
                temperature: self.temperature,
                top_p: self.top_p,
                repetition_penalty: self.repeat_penalty,
                max_new_tokens: self.max_new_tokens,
            },
        }
    }
}

/// Parse a single key-value pair
fn parse_key_val(s: &str) -> anyhow::Result<(String, OverrideValue)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    let key = s[..pos].parse()?;
    let value = &s[pos + 1..];
    let value = i64::from_str(value)
        .map(OverrideValue::Int)
        .or_else(|_| f64::from_str(value).map(OverrideValue::Float))
        .or_else(|_| bool::from_str(value).map(OverrideValue::Bool))
        .map_err(|_| anyhow!("must be one of i64, f64, or bool"))?;

    Ok((key, value))
}

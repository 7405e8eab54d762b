use clap::Parser;
use rougebench::generate::DEFAULT_END_OF_TURN_TOKEN;
use std::path::PathBuf;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SystemPromptMode {
    /// Same evaluation instruction for every record (see --system-prompt)
    #[default]
    Fixed,
    /// Use each record's `instruction` field
    PerRecord,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OnError {
    /// Abort the whole run on the first failed generation
    #[default]
    Abort,
    /// Drop the failed record and keep going
    Skip,
}

/// Generate replies for a JSON dataset and score them against the references with ROUGE
#[derive(Parser, Debug)]
#[command(name = "rougebench", version, about)]
pub struct Args {
    /// Input file in JSON format
    #[arg(short, long, env = "ROUGEBENCH_INPUT")]
    pub input: PathBuf,

    /// Generative model, e.g. ollama/llama3.1:8b, vllm/<hf-id>, openai/<name>
    #[arg(short, long, env = "ROUGEBENCH_MODEL")]
    pub model: String,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.4, env = "ROUGEBENCH_TEMPERATURE")]
    pub temperature: f32,

    /// Top-p (nucleus) sampling
    #[arg(long, default_value_t = 0.95, env = "ROUGEBENCH_TOPP")]
    pub topp: f32,

    /// Maximum generation requests in flight
    #[arg(long, default_value_t = 1, env = "ROUGEBENCH_CONCURRENCY")]
    pub concurrency: usize,

    /// Only evaluate the first N records
    #[arg(long, env = "ROUGEBENCH_LIMIT")]
    pub limit: Option<usize>,

    /// Where the system turn comes from
    #[arg(long, value_enum, default_value_t = SystemPromptMode::Fixed, env = "ROUGEBENCH_SYSTEM_PROMPT_MODE")]
    pub system_prompt_mode: SystemPromptMode,

    /// Override the fixed system prompt
    #[arg(long, env = "ROUGEBENCH_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// What to do when a generation fails
    #[arg(long, value_enum, default_value_t = OnError::Abort, env = "ROUGEBENCH_ON_ERROR")]
    pub on_error: OnError,

    /// Tokenizer used to resolve stop tokens: a Hugging Face repo id or a
    /// tokenizer.json path. Defaults to the built-in Llama 3 special tokens.
    #[arg(long, env = "ROUGEBENCH_TOKENIZER")]
    pub tokenizer: Option<String>,

    /// End-of-sequence token
    #[arg(long, default_value = "<|end_of_text|>", env = "ROUGEBENCH_EOS_TOKEN")]
    pub eos_token: String,

    /// Additional end-of-turn stop token
    #[arg(long, default_value = DEFAULT_END_OF_TURN_TOKEN, env = "ROUGEBENCH_END_OF_TURN_TOKEN")]
    pub end_of_turn_token: String,

    /// No progress bar and no echoed replies
    #[arg(short, long)]
    pub silent: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

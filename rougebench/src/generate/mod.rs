//! Per-record generation.
//!
//! Each record becomes a two-turn conversation (system prompt, then the
//! record's input), the backend appends the model's reply, and the reply is
//! paired with the record's reference output. Candidates and references
//! come back index-aligned in input order regardless of how many requests
//! were in flight.

pub mod backend;
mod progress;
mod vocab;

#[cfg(feature = "tok")]
pub use vocab::HfVocabulary;
pub use vocab::{
    DEFAULT_END_OF_TURN_TOKEN, SpecialToken, SpecialTokens, StopTokens, Vocabulary,
};

use crate::{
    error::{EvalError, EvalResult},
    ir::{Conversation, Message},
    load::Record,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Given the following clinical note, list possible diagnoses that could account for the patient's symptons and conditions.  Aim to cover all relevant possibilities.";

/// Generation capability: extend a conversation with the model's reply.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Vocabulary used to resolve the stop tokens
    fn vocabulary(&self) -> &dyn Vocabulary;

    /// Returns `conversation` with an assistant turn appended
    async fn generate(
        &self,
        conversation: Conversation,
        stop: &StopTokens,
        sampling: &SamplingConfig,
    ) -> anyhow::Result<Conversation>;
}

/// Sampling parameters sent with every request.
#[derive(Clone, Debug, PartialEq, Serialize, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SamplingConfig {
    /// Sampling temperature
    #[builder(default = "0.4")]
    pub temperature: f32,

    /// Nucleus sampling mass
    #[builder(default = "0.95")]
    pub top_p: f32,

    /// Hard cap on generated tokens
    #[builder(default = "512")]
    pub max_new_tokens: u32,

    /// Greedy decoding is never used
    #[builder(setter(skip), default = "true")]
    do_sample: bool,
}

impl SamplingConfig {
    pub fn do_sample(&self) -> bool {
        self.do_sample
    }
}

impl SamplingConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(t) = self.temperature
            && !(t.is_finite() && t > 0.0)
        {
            return Err(format!("temperature must be positive, got {t}"));
        }
        if let Some(p) = self.top_p
            && !(p > 0.0 && p <= 1.0)
        {
            return Err(format!("top_p must be in (0, 1], got {p}"));
        }
        if self.max_new_tokens == Some(0) {
            return Err("max_new_tokens must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: 0.95,
            max_new_tokens: 512,
            do_sample: true,
        }
    }
}

impl From<SamplingConfigBuilderError> for EvalError {
    fn from(e: SamplingConfigBuilderError) -> Self {
        EvalError::Config(e.to_string())
    }
}

/// Where the system turn of each conversation comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SystemPrompt {
    /// The same evaluation instruction for every record
    Fixed(String),
    /// Each record's own `instruction` field
    PerRecord,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        SystemPrompt::Fixed(DEFAULT_SYSTEM_PROMPT.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The first failed record aborts the batch
    #[default]
    Abort,
    /// Drop failed records from both sequences and keep going
    Skip,
}

#[derive(Clone, Debug, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct GenerateOptions {
    #[builder(default)]
    pub system_prompt: SystemPrompt,

    /// Stop token in addition to the vocabulary's end-of-sequence token
    #[builder(default = "DEFAULT_END_OF_TURN_TOKEN.to_string()", setter(into))]
    pub end_of_turn_token: String,

    /// Maximum requests in flight
    #[builder(default = "1")]
    pub concurrency: usize,

    #[builder(default)]
    pub on_failure: FailurePolicy,

    /// No progress bar, no echoed replies
    #[builder(default)]
    pub silent: bool,
}

impl GenerateOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("concurrency must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            system_prompt: SystemPrompt::default(),
            end_of_turn_token: DEFAULT_END_OF_TURN_TOKEN.to_string(),
            concurrency: 1,
            on_failure: FailurePolicy::default(),
            silent: false,
        }
    }
}

impl From<GenerateOptionsBuilderError> for EvalError {
    fn from(e: GenerateOptionsBuilderError) -> Self {
        EvalError::Config(e.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

/// Index-aligned generation output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    pub candidates: Vec<String>,
    pub references: Vec<String>,
    /// Records dropped under [`FailurePolicy::Skip`], in input order
    pub skipped: Vec<SkippedRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub fn build_conversation(record: &Record, system_prompt: &SystemPrompt) -> Conversation {
    let system = match system_prompt {
        SystemPrompt::Fixed(text) => text.clone(),
        SystemPrompt::PerRecord => record.instruction.clone(),
    };
    Conversation::new(vec![
        Message::System(system),
        Message::User(record.input.clone()),
    ])
}

fn extract_reply(conversation: Conversation) -> anyhow::Result<String> {
    if let Some(reply) = conversation.reply() {
        return Ok(reply.to_string());
    }
    match conversation.last() {
        Some(other) => anyhow::bail!("conversation ends with a {} turn", other.role()),
        None => anyhow::bail!("backend returned an empty conversation"),
    }
}

/// Generate a reply for every record and pair it with the record's reference.
pub async fn generate_batch(
    records: &[Record],
    generator: &dyn Generator,
    sampling: &SamplingConfig,
    options: &GenerateOptions,
) -> EvalResult<Batch> {
    // Resolved once up front; an unknown token fails before any request is sent
    let stop = StopTokens::resolve(generator.vocabulary(), &options.end_of_turn_token)?;
    let stop = &stop;

    let pb = progress::bar(records.len(), options.silent);

    let mut replies = stream::iter(records.iter().enumerate())
        .map(|(index, record)| {
            let conversation = build_conversation(record, &options.system_prompt);
            async move {
                let outcome = generator
                    .generate(conversation, stop, sampling)
                    .await
                    .and_then(extract_reply);
                (index, outcome)
            }
        })
        .buffer_unordered(options.concurrency.max(1));

    let mut completed: Vec<(usize, String)> = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    while let Some((index, outcome)) = replies.next().await {
        pb.inc(1);
        match outcome {
            Ok(reply) => {
                tracing::debug!(index, "Generated reply");
                if !options.silent {
                    pb.suspend(|| println!("{reply}"));
                }
                completed.push((index, reply));
            }
            Err(e) => {
                let message = format!("{e:#}");
                match options.on_failure {
                    FailurePolicy::Abort => {
                        pb.abandon_with_message(format!("Record {index} failed"));
                        return Err(EvalError::Generation { index, message });
                    }
                    FailurePolicy::Skip => {
                        tracing::warn!(index, error = %message, "Skipping record");
                        skipped.push(SkippedRecord {
                            index,
                            reason: message,
                        });
                    }
                }
            }
        }
    }

    pb.finish_with_message(format!("Done {}/{}", completed.len(), records.len()));

    completed.sort_unstable_by_key(|(index, _)| *index);
    skipped.sort_unstable_by_key(|s| s.index);

    let (candidates, references) = completed
        .into_iter()
        .map(|(index, reply)| (reply, records[index].output.clone()))
        .unzip();

    Ok(Batch {
        candidates,
        references,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers each input with a canned reply. Inputs containing "FAIL"
    /// error out; later records finish first so completion order is reversed.
    struct Canned {
        vocabulary: SpecialTokens,
        replies: HashMap<String, String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Conversation>>,
    }

    impl Canned {
        fn new(replies: &[(&str, &str)]) -> Self {
            Self {
                vocabulary: SpecialTokens::llama3(),
                replies: replies
                    .iter()
                    .map(|(i, o)| (i.to_string(), o.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait::async_trait]
    impl Generator for Canned {
        fn vocabulary(&self) -> &dyn Vocabulary {
            &self.vocabulary
        }

        async fn generate(
            &self,
            conversation: Conversation,
            stop: &StopTokens,
            _sampling: &SamplingConfig,
        ) -> anyhow::Result<Conversation> {
            assert_eq!(stop.ids(), [128001, 128009]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(conversation.clone());

            let input = conversation
                .messages()
                .get(1)
                .map(|m| m.content().to_string())
                .unwrap_or_default();
            if input.contains("FAIL") {
                anyhow::bail!("backend exploded");
            }

            let delay = 50u64.saturating_sub(5 * input.len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let reply = self.replies.get(&input).cloned().unwrap_or_default();
            Ok(conversation.with_reply(reply))
        }
    }

    fn record(instruction: &str, input: &str, output: &str) -> Record {
        Record {
            instruction: instruction.into(),
            input: input.into(),
            output: output.into(),
        }
    }

    fn silent() -> GenerateOptions {
        GenerateOptionsBuilder::default().silent(true).build().unwrap()
    }

    // ---- config ----

    #[test]
    fn sampling_defaults() {
        let config = SamplingConfigBuilder::default().build().unwrap();
        assert_eq!(config, SamplingConfig::default());
        assert_eq!(config.temperature, 0.4);
        assert_eq!(config.top_p, 0.95);
        assert_eq!(config.max_new_tokens, 512);
        assert!(config.do_sample());
    }

    #[test]
    fn sampling_rejects_bad_values() {
        assert!(SamplingConfigBuilder::default().temperature(0.0).build().is_err());
        assert!(SamplingConfigBuilder::default().temperature(f32::NAN).build().is_err());
        assert!(SamplingConfigBuilder::default().top_p(1.5).build().is_err());
        assert!(SamplingConfigBuilder::default().max_new_tokens(0).build().is_err());

        let err: EvalError = SamplingConfigBuilder::default()
            .top_p(0.0)
            .build()
            .unwrap_err()
            .into();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn options_reject_zero_concurrency() {
        assert!(GenerateOptionsBuilder::default().concurrency(0).build().is_err());
    }

    // ---- conversation ----

    #[test]
    fn conversation_uses_fixed_prompt_by_default() {
        let r = record("x", "Patient has fever and cough.", "Influenza.");
        let c = build_conversation(&r, &SystemPrompt::default());
        assert_eq!(
            c.messages(),
            &[
                Message::System(DEFAULT_SYSTEM_PROMPT.to_string()),
                Message::User("Patient has fever and cough.".to_string()),
            ]
        );
    }

    #[test]
    fn conversation_per_record_prompt() {
        let r = record("List diagnoses", "chest pain", "MI");
        let c = build_conversation(&r, &SystemPrompt::PerRecord);
        assert_eq!(c.messages()[0], Message::System("List diagnoses".into()));
    }

    #[test]
    fn default_prompt_is_sent_byte_for_byte() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("patient's symptons and conditions.  Aim to cover"));
        let SystemPrompt::Fixed(text) = SystemPrompt::default() else {
            panic!("default strategy should be fixed");
        };
        assert_eq!(text, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn extract_reply_requires_assistant_turn() {
        let c = Conversation::new(vec![Message::User("hi".into())]);
        assert!(extract_reply(c).is_err());
        assert!(extract_reply(Conversation::default()).is_err());
    }

    // ---- generate_batch ----

    #[tokio::test]
    async fn preserves_order_under_concurrency() {
        let records: Vec<Record> = (0..8)
            .map(|i| record("x", &"i".repeat(i + 1), &format!("reference {i}")))
            .collect();
        let canned: Vec<(String, String)> = (0..8)
            .map(|i| ("i".repeat(i + 1), format!("reply {i}")))
            .collect();
        let pairs: Vec<(&str, &str)> = canned
            .iter()
            .map(|(a, b)| (a.as_str(), b.as_str()))
            .collect();
        let generator = Canned::new(&pairs);

        let options = GenerateOptionsBuilder::default()
            .silent(true)
            .concurrency(4)
            .build()
            .unwrap();
        let batch = generate_batch(&records, &generator, &SamplingConfig::default(), &options)
            .await
            .unwrap();

        assert_eq!(batch.len(), 8);
        for i in 0..8 {
            assert_eq!(batch.candidates[i], format!("reply {i}"));
            assert_eq!(batch.references[i], records[i].output);
        }
        assert!(batch.skipped.is_empty());
    }

    #[tokio::test]
    async fn references_are_verbatim() {
        let records = vec![record("x", "a", "  Influenza.\n")];
        let generator = Canned::new(&[("a", "flu")]);
        let batch = generate_batch(&records, &generator, &SamplingConfig::default(), &silent())
            .await
            .unwrap();
        assert_eq!(batch.references, vec!["  Influenza.\n".to_string()]);
    }

    #[tokio::test]
    async fn failure_aborts_batch() {
        let records = vec![
            record("x", "a", "A"),
            record("x", "FAIL", "B"),
            record("x", "c", "C"),
        ];
        let generator = Canned::new(&[("a", "A"), ("c", "C")]);
        let err = generate_batch(&records, &generator, &SamplingConfig::default(), &silent())
            .await
            .unwrap_err();

        match err {
            EvalError::Generation { index, message } => {
                assert_eq!(index, 1);
                assert!(message.contains("backend exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Sequential by default, so the third record is never requested
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn skip_policy_keeps_alignment() {
        let records = vec![
            record("x", "a", "A"),
            record("x", "FAIL", "B"),
            record("x", "c", "C"),
        ];
        let generator = Canned::new(&[("a", "reply a"), ("c", "reply c")]);
        let options = GenerateOptionsBuilder::default()
            .silent(true)
            .on_failure(FailurePolicy::Skip)
            .build()
            .unwrap();
        let batch = generate_batch(&records, &generator, &SamplingConfig::default(), &options)
            .await
            .unwrap();

        assert_eq!(batch.candidates, vec!["reply a", "reply c"]);
        assert_eq!(batch.references, vec!["A", "C"]);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].index, 1);
    }

    #[tokio::test]
    async fn unknown_stop_token_fails_before_generation() {
        let records = vec![record("x", "a", "A")];
        let generator = Canned::new(&[("a", "A")]);
        let options = GenerateOptionsBuilder::default()
            .silent(true)
            .end_of_turn_token("<|im_end|>")
            .build()
            .unwrap();
        let err = generate_batch(&records, &generator, &SamplingConfig::default(), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, EvalError::Config(_)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn per_record_prompt_reaches_backend() {
        let records = vec![record("Summarize", "a", "A")];
        let generator = Canned::new(&[("a", "A")]);
        let options = GenerateOptionsBuilder::default()
            .silent(true)
            .system_prompt(SystemPrompt::PerRecord)
            .build()
            .unwrap();
        generate_batch(&records, &generator, &SamplingConfig::default(), &options)
            .await
            .unwrap();

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen[0].messages()[0], Message::System("Summarize".into()));
    }

    #[tokio::test]
    async fn empty_input_gives_empty_batch() {
        let generator = Canned::new(&[]);
        let batch = generate_batch(&[], &generator, &SamplingConfig::default(), &silent())
            .await
            .unwrap();
        assert!(batch.is_empty());
    }
}

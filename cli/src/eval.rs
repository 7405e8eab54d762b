use crate::args::{Args, OnError, SystemPromptMode};
use rougebench::{
    EvalError, EvalResult, FailurePolicy, GenerateOptions, GenerateOptionsBuilder, SamplingConfig,
    SamplingConfigBuilder, SystemPrompt, aggregate,
    generate::{SpecialTokens, Vocabulary, backend},
    generate_batch, load,
};

fn sampling_config(args: &Args) -> EvalResult<SamplingConfig> {
    Ok(SamplingConfigBuilder::default()
        .temperature(args.temperature)
        .top_p(args.topp)
        .build()?)
}

fn generate_options(args: &Args) -> EvalResult<GenerateOptions> {
    let system_prompt = match (args.system_prompt_mode, &args.system_prompt) {
        (SystemPromptMode::PerRecord, _) => SystemPrompt::PerRecord,
        (SystemPromptMode::Fixed, Some(text)) => SystemPrompt::Fixed(text.clone()),
        (SystemPromptMode::Fixed, None) => SystemPrompt::default(),
    };
    let on_failure = match args.on_error {
        OnError::Abort => FailurePolicy::Abort,
        OnError::Skip => FailurePolicy::Skip,
    };

    Ok(GenerateOptionsBuilder::default()
        .system_prompt(system_prompt)
        .end_of_turn_token(args.end_of_turn_token.as_str())
        .concurrency(args.concurrency)
        .on_failure(on_failure)
        .silent(args.silent)
        .build()?)
}

fn vocabulary(args: &Args) -> EvalResult<Box<dyn Vocabulary>> {
    match &args.tokenizer {
        #[cfg(feature = "tok")]
        Some(source) => Ok(Box::new(rougebench::generate::HfVocabulary::load(
            source,
            args.eos_token.as_str(),
        )?)),
        #[cfg(not(feature = "tok"))]
        Some(_) => Err(EvalError::Config(
            "--tokenizer needs the `tok` feature".into(),
        )),
        None => Ok(Box::new(
            SpecialTokens::llama3().with_eos(args.eos_token.as_str()),
        )),
    }
}

fn print_hyperparameters(args: &Args, sampling: &SamplingConfig, options: &GenerateOptions) {
    let system_prompt = match &options.system_prompt {
        SystemPrompt::Fixed(_) => "fixed",
        SystemPrompt::PerRecord => "per-record",
    };
    println!(
        "Model: {} | Temperature: {} | Top-p: {} | Max new tokens: {} | System prompt: {} | Concurrency: {}",
        args.model,
        sampling.temperature,
        sampling.top_p,
        sampling.max_new_tokens,
        system_prompt,
        options.concurrency
    );
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let sampling = sampling_config(&args)?;
    let options = generate_options(&args)?;

    let mut records = load(&args.input)?;
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }
    if records.is_empty() {
        return Err(EvalError::EmptyBatch.into());
    }
    tracing::info!("Loaded {} records from {}", records.len(), args.input.display());

    let generator = backend::connect(&args.model, vocabulary(&args)?)?;
    let batch = generate_batch(&records, generator.as_ref(), &sampling, &options).await?;

    if !batch.skipped.is_empty() {
        eprintln!("\nSkipped {} of {} records:", batch.skipped.len(), records.len());
        for skipped in &batch.skipped {
            eprintln!("  record {}: {}", skipped.index, skipped.reason);
        }
    }

    let report = aggregate(&batch.candidates, &batch.references)?;

    println!();
    print_hyperparameters(&args, &sampling, &options);
    print!("{report}");

    Ok(())
}

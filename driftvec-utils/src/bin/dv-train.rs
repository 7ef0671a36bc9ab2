use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};

use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches};
use driftvec::{
    ContextVariant, LanguageModelVariant, SamplerVariant, Sentences, SgnsConfig, SgnsModel,
    WriteModelBinary, EOS,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

static CORPUS: &str = "CORPUS";
static OUTPUT: &str = "OUTPUT";
static CONTEXT: &str = "context";
static CONTEXT_STRATEGY: &str = "context-strategy";
static DIMS: &str = "dims";
static EPOCHS: &str = "epochs";
static LANGUAGE_MODEL: &str = "language-model";
static METADATA: &str = "metadata";
static NEGATIVES: &str = "negatives";
static NO_SUBSAMPLE: &str = "no-subsample";
static SAMPLER: &str = "sampler";
static SEED: &str = "seed";
static THRESHOLD: &str = "threshold";
static VOCAB_SIZE: &str = "vocab-size";

fn main() -> Result<()> {
    env_logger::init();

    let matches = build_app().get_matches();
    let config = config_from_matches(&matches)?;
    let corpus = matches.value_of(CORPUS).unwrap();
    let output = matches.value_of(OUTPUT).unwrap();
    let epochs: usize = parse_arg(&matches, EPOCHS)?.unwrap_or(1);
    let subsample = !matches.is_present(NO_SUBSAMPLE);

    let rng = match parse_arg::<u64>(&matches, SEED)? {
        Some(seed) => XorShiftRng::seed_from_u64(seed),
        None => XorShiftRng::from_entropy(),
    };

    let mut model = SgnsModel::from_config(&config, rng)?;

    for epoch in 0..epochs {
        train_epoch(&mut model, corpus, subsample)?;
        info!(
            "epoch {} complete: {} tokens, {} types",
            epoch + 1,
            model.language_model().total(),
            model.language_model().size()
        );
    }

    let mut writer = BufWriter::new(
        File::create(output).context("cannot open output file for writing")?,
    );
    model
        .write_model_binary(&mut writer)
        .context("cannot write model")?;

    if let Some(metadata) = matches.value_of(METADATA) {
        std::fs::write(metadata, toml::to_string_pretty(&config)?)
            .context("cannot write metadata")?;
    }

    Ok(())
}

fn train_epoch(model: &mut SgnsModel<XorShiftRng>, corpus: &str, subsample: bool) -> Result<()> {
    let file = File::open(corpus).context("cannot open corpus for reading")?;
    let corpus_bytes = file.metadata().context("cannot stat corpus")?.len();
    let progress = ProgressBar::new(corpus_bytes);
    progress.set_style(
        ProgressStyle::default_bar().template("{bar:30} {bytes}/{total_bytes} ETA: {eta_precise}"),
    );

    let reader = BufReader::new(ProgressReader {
        inner: file,
        bar: progress.clone(),
    });
    for sentence in Sentences::new(reader) {
        let mut sentence = sentence.context("cannot read sentence")?;
        sentence.push(EOS.to_owned());
        if subsample {
            model.subsampling_sentence_train(&sentence)?;
        } else {
            model.sentence_train(&sentence)?;
        }
    }
    progress.finish();

    Ok(())
}

/// Advances a byte-level progress bar as the corpus is consumed.
struct ProgressReader<R> {
    inner: R,
    bar: ProgressBar,
}

impl<R> Read for ProgressReader<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n_read = self.inner.read(buf)?;
        self.bar.inc(n_read as u64);
        Ok(n_read)
    }
}

fn build_app() -> App<'static, 'static> {
    App::new("dv-train")
        .about("Train a streaming skip-gram embedding model")
        .settings(&[AppSettings::DontCollapseArgsInUsage])
        .arg(
            Arg::with_name(CORPUS)
                .help("Tokenized corpus (one sentence per line)")
                .index(1)
                .required(true),
        )
        .arg(
            Arg::with_name(OUTPUT)
                .help("Output model file")
                .index(2)
                .required(true),
        )
        .arg(
            Arg::with_name(CONTEXT)
                .long("context")
                .value_name("SIZE")
                .help("Symmetric context window size"),
        )
        .arg(
            Arg::with_name(CONTEXT_STRATEGY)
                .long("context-strategy")
                .value_name("STRATEGY")
                .possible_values(&["static", "dynamic"])
                .help("Context window strategy"),
        )
        .arg(
            Arg::with_name(DIMS)
                .long("dims")
                .value_name("DIMS")
                .help("Embedding dimensionality"),
        )
        .arg(
            Arg::with_name(EPOCHS)
                .long("epochs")
                .value_name("N")
                .help("Number of passes over the corpus"),
        )
        .arg(
            Arg::with_name(LANGUAGE_MODEL)
                .long("language-model")
                .value_name("MODEL")
                .possible_values(&["naive", "spacesaving"])
                .help("Vocabulary counting strategy"),
        )
        .arg(
            Arg::with_name(METADATA)
                .long("metadata")
                .value_name("FILE")
                .help("Write the training configuration as TOML"),
        )
        .arg(
            Arg::with_name(NEGATIVES)
                .long("negatives")
                .value_name("N")
                .help("Negative samples per context word"),
        )
        .arg(
            Arg::with_name(NO_SUBSAMPLE)
                .long("no-subsample")
                .help("Train on all tokens instead of subsampling frequent ones"),
        )
        .arg(
            Arg::with_name(SAMPLER)
                .long("sampler")
                .value_name("SAMPLER")
                .possible_values(&["uniform", "empirical", "reservoir"])
                .help("Negative sampling strategy"),
        )
        .arg(
            Arg::with_name(SEED)
                .long("seed")
                .value_name("SEED")
                .help("RNG seed for a reproducible run"),
        )
        .arg(
            Arg::with_name(THRESHOLD)
                .long("threshold")
                .value_name("T")
                .help("Frequent-word subsampling threshold"),
        )
        .arg(
            Arg::with_name(VOCAB_SIZE)
                .long("vocab-size")
                .value_name("SIZE")
                .help("Maximum vocabulary size"),
        )
}

fn config_from_matches(matches: &ArgMatches) -> Result<SgnsConfig> {
    let mut config = SgnsConfig::default();

    if let Some(dims) = parse_arg(matches, DIMS)? {
        config.factorization.embedding_dim = dims;
    }
    if let Some(vocab_size) = parse_arg(matches, VOCAB_SIZE)? {
        config.factorization.vocab_dim = vocab_size;
    }
    if let Some(context) = parse_arg(matches, CONTEXT)? {
        config.context.symm_context = context;
    }
    if let Some(negatives) = parse_arg(matches, NEGATIVES)? {
        config.learner.neg_samples = negatives;
    }
    if let Some(threshold) = parse_arg(matches, THRESHOLD)? {
        config.vocab.subsample_threshold = threshold;
    }
    if let Some(strategy) = matches.value_of(CONTEXT_STRATEGY) {
        config.context.variant = match strategy {
            "static" => ContextVariant::Static,
            "dynamic" => ContextVariant::Dynamic,
            _ => unreachable!(),
        };
    }
    if let Some(language_model) = matches.value_of(LANGUAGE_MODEL) {
        config.vocab.variant = match language_model {
            "naive" => LanguageModelVariant::Naive,
            "spacesaving" => LanguageModelVariant::SpaceSaving,
            _ => unreachable!(),
        };
    }
    if let Some(sampler) = matches.value_of(SAMPLER) {
        config.sampler.variant = match sampler {
            "uniform" => SamplerVariant::Uniform,
            "empirical" => SamplerVariant::Empirical,
            "reservoir" => SamplerVariant::Reservoir,
            _ => unreachable!(),
        };
    }

    config.validate()?;
    Ok(config)
}

fn parse_arg<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    matches
        .value_of(name)
        .map(|v| {
            v.parse()
                .map_err(|e| anyhow!("cannot parse --{} {}: {}", name, v, e))
        })
        .transpose()
}

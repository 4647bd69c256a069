//! Concurrent chunked inference orchestration
//!
//! Passes run sequentially; chunks within a pass fan out to a bounded worker
//! pool. Provider calls are blocking and run on dedicated blocking threads;
//! tokenization, normalization, alignment, and merging stay on the
//! submitting task. Results are buffered by chunk index, so the output is
//! deterministic no matter how workers interleave.

use crate::aligner::Aligner;
use crate::chunker::{Chunk, Chunker};
use crate::config::ExtractConfig;
use crate::error::ExtractError;
use crate::merger::PassMerger;
use crate::normalizer::{FormatNormalizer, RawExtraction};
use crate::prompt::{PromptBuilder, PARSE_RETRY_REMINDER};
use crate::tokenizer::{TokenSpan, Tokenizer};
use grapnel_domain::{
    AnnotatedDocument, ChunkWarning, Document, Extraction, InferenceError, InferenceOptions,
    LanguageModel,
};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const BACKOFF_BASE: Duration = Duration::from_millis(250);
const BACKOFF_JITTER: f64 = 0.2;

/// Extractions per chunk plus degradation notes for one pass
struct PassOutcome {
    chunk_extractions: Vec<Vec<Extraction>>,
    warnings: Vec<ChunkWarning>,
}

/// Orchestrates chunked inference for documents
pub struct Annotator<L: LanguageModel + 'static> {
    model: Arc<L>,
    prompt_builder: PromptBuilder,
    normalizer: FormatNormalizer,
    aligner: Aligner,
    tokenizer: Tokenizer,
    chunker: Chunker,
    config: ExtractConfig,
    options: InferenceOptions,
}

impl<L: LanguageModel + 'static> Annotator<L> {
    /// Create an annotator around a shared model
    pub fn new(
        model: Arc<L>,
        prompt_builder: PromptBuilder,
        config: ExtractConfig,
        options: InferenceOptions,
    ) -> Self {
        Self {
            aligner: Aligner::new(&config),
            normalizer: FormatNormalizer::new("extractions", config.attribute_suffix.clone()),
            chunker: Chunker::new(config.max_char_buffer),
            tokenizer: Tokenizer::new(),
            prompt_builder,
            model,
            config,
            options,
        }
    }

    /// Annotate a batch of documents, preserving input order
    pub async fn annotate_batch(
        &self,
        documents: &[Document],
    ) -> Result<Vec<AnnotatedDocument>, ExtractError> {
        let mut annotated = Vec::with_capacity(documents.len());
        for document in documents {
            annotated.push(self.annotate(document).await?);
        }
        Ok(annotated)
    }

    /// Annotate one document
    pub async fn annotate(&self, document: &Document) -> Result<AnnotatedDocument, ExtractError> {
        let tokens = self.tokenizer.tokenize(&document.text);
        let chunks = self.chunker.chunk(document, &tokens);

        debug!(
            document_id = %document.id,
            tokens = tokens.len(),
            chunks = chunks.len(),
            passes = self.config.extraction_passes,
            "starting annotation"
        );

        let mut per_pass: Vec<Vec<Vec<Extraction>>> = Vec::new();
        let mut warnings = Vec::new();
        for pass in 0..self.config.extraction_passes {
            let outcome = self.run_pass(pass, document, &tokens, &chunks).await?;
            per_pass.push(outcome.chunk_extractions);
            warnings.extend(outcome.warnings);
        }

        let mut extractions = Vec::new();
        for chunk_index in 0..chunks.len() {
            let lists: Vec<Vec<Extraction>> = per_pass
                .iter()
                .map(|pass| pass[chunk_index].clone())
                .collect();
            extractions.extend(PassMerger::merge(lists));
        }

        // Document order: by grounded interval; unaligned records trail in
        // emission order (stable sort)
        extractions.sort_by_key(|e| match e.char_interval {
            Some(interval) => (interval.start, interval.end),
            None => (u32::MAX, u32::MAX),
        });

        info!(
            document_id = %document.id,
            extractions = extractions.len(),
            warnings = warnings.len(),
            "annotation complete"
        );

        Ok(AnnotatedDocument {
            document_id: document.id.clone(),
            text: document.text.clone(),
            extractions,
            warnings,
        })
    }

    /// Run one full pass over all chunks
    async fn run_pass(
        &self,
        pass: u32,
        document: &Document,
        tokens: &[TokenSpan],
        chunks: &[Chunk],
    ) -> Result<PassOutcome, ExtractError> {
        let prompts: Vec<String> = chunks
            .iter()
            .map(|chunk| {
                let context = self.trailing_context(document, chunks, chunk.chunk_index);
                self.prompt_builder
                    .build(&chunk.prompt_text(&document.text), context.as_deref())
            })
            .collect();

        let jobs: Vec<(usize, String)> = prompts.iter().cloned().enumerate().collect();
        let responses = self.fan_out(jobs).await?;

        let mut raws: BTreeMap<usize, Vec<RawExtraction>> = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut parse_retries: Vec<(usize, String)> = Vec::new();

        for (chunk_index, outcome) in responses {
            match outcome {
                Ok(text) => match self.normalizer.normalize(&text) {
                    Ok(list) => {
                        raws.insert(chunk_index, list);
                    }
                    Err(err) => {
                        debug!(chunk_index, error = %err, "unparseable output, re-asking once");
                        parse_retries.push((
                            chunk_index,
                            format!("{}\n\n{}", prompts[chunk_index], PARSE_RETRY_REMINDER),
                        ));
                    }
                },
                Err(err) => {
                    warn!(chunk_index, error = %err, "chunk degraded to empty after retries");
                    warnings.push(ChunkWarning {
                        pass,
                        chunk_index,
                        message: format!("inference failed after retries: {}", err),
                    });
                    raws.insert(chunk_index, Vec::new());
                }
            }
        }

        if !parse_retries.is_empty() {
            let retry_responses = self.fan_out(parse_retries).await?;
            for (chunk_index, outcome) in retry_responses {
                let failure = match outcome {
                    Ok(text) => match self.normalizer.normalize(&text) {
                        Ok(list) => {
                            raws.insert(chunk_index, list);
                            continue;
                        }
                        Err(err) => format!("unparseable output after reminder: {}", err),
                    },
                    Err(err) => format!("inference failed on parse retry: {}", err),
                };
                warn!(chunk_index, %failure, "chunk degraded to empty");
                warnings.push(ChunkWarning {
                    pass,
                    chunk_index,
                    message: failure,
                });
                raws.insert(chunk_index, Vec::new());
            }
        }

        let chunk_extractions = chunks
            .iter()
            .map(|chunk| {
                let list = raws.remove(&chunk.chunk_index).unwrap_or_default();
                let source =
                    &tokens[chunk.token_interval.start as usize..chunk.token_interval.end as usize];
                self.aligner.align(list, source)
            })
            .collect();

        Ok(PassOutcome {
            chunk_extractions,
            warnings,
        })
    }

    /// Fan chunk prompts out to the bounded worker pool
    ///
    /// Inner errors are retriable failures that exhausted their budget; a
    /// non-retriable provider error aborts the whole run, and dropping the
    /// join set cancels the remaining in-flight tasks.
    async fn fan_out(
        &self,
        jobs: Vec<(usize, String)>,
    ) -> Result<BTreeMap<usize, Result<String, InferenceError>>, ExtractError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut join_set = JoinSet::new();

        for (chunk_index, prompt) in jobs {
            let semaphore = Arc::clone(&semaphore);
            let model = Arc::clone(&self.model);
            let options = self.options.clone();
            let max_retries = self.config.max_retries;
            let request_timeout = self.config.request_timeout();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            chunk_index,
                            Err(InferenceError::Runtime("worker pool closed".to_string())),
                        )
                    }
                };
                let result =
                    infer_with_retry(model, prompt, options, max_retries, request_timeout).await;
                (chunk_index, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            let (chunk_index, result) = joined.map_err(|e| ExtractError::InferenceRuntime {
                attempts: 0,
                original: InferenceError::Runtime(format!("worker task failed: {}", e)),
            })?;
            match result {
                Err(err) if !err.is_retriable() => {
                    return Err(ExtractError::InferenceConfig(err));
                }
                other => {
                    results.insert(chunk_index, other);
                }
            }
        }
        Ok(results)
    }

    /// Tail of the previous chunk, injected as prompt context
    fn trailing_context(
        &self,
        document: &Document,
        chunks: &[Chunk],
        chunk_index: usize,
    ) -> Option<String> {
        if self.config.context_window_chars == 0 || chunk_index == 0 {
            return None;
        }
        let view = chunks[chunk_index - 1].text_view(&document.text);
        let chars: Vec<char> = view.chars().collect();
        let start = chars.len().saturating_sub(self.config.context_window_chars);
        Some(chars[start..].iter().collect())
    }
}

/// One chunk's inference with timeout, retry, and jittered backoff
async fn infer_with_retry<L: LanguageModel + 'static>(
    model: Arc<L>,
    prompt: String,
    options: InferenceOptions,
    max_retries: u32,
    request_timeout: Duration,
) -> Result<String, InferenceError> {
    let mut attempt = 0u32;
    loop {
        let call_model = Arc::clone(&model);
        let call_prompt = prompt.clone();
        let call_options = options.clone();
        let call =
            tokio::task::spawn_blocking(move || call_model.infer(&[call_prompt], &call_options));

        let outcome = match timeout(request_timeout, call).await {
            Err(_) => Err(InferenceError::Runtime(format!(
                "request timed out after {:?}",
                request_timeout
            ))),
            Ok(Err(join_err)) => Err(InferenceError::Runtime(format!(
                "inference worker failed: {}",
                join_err
            ))),
            Ok(Ok(Ok(mut texts))) => {
                if texts.is_empty() {
                    Err(InferenceError::Output(
                        "provider returned an empty batch".to_string(),
                    ))
                } else {
                    Ok(texts.remove(0))
                }
            }
            Ok(Ok(Err(err))) => Err(err),
        };

        match outcome {
            Ok(text) => return Ok(text),
            Err(err) if err.is_retriable() && attempt < max_retries => {
                let delay = backoff_delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "inference attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Exponential backoff from 250 ms, jittered ±20%
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE * 2u32.saturating_pow(attempt);
    let jitter = 1.0 - BACKOFF_JITTER + rand::thread_rng().gen::<f64>() * (2.0 * BACKOFF_JITTER);
    base.mul_f64(jitter)
}

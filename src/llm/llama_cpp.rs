use anyhow::Context;
use encoding_rs::Decoder;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::kv_overrides::ParamOverrideValue;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use log::{debug, info};
use std::ffi::CString;
use std::num::NonZeroU32;
use std::pin::pin;
use std::time::Instant;

use super::{GenerateError, GenerationParams, TextGenerator};
use crate::args_handler::{Args, OverrideValue};

/// How many recent tokens the repetition penalty looks at.
const PENALTY_LAST_N: i32 = 64;

impl From<OverrideValue> for ParamOverrideValue {
    fn from(value: OverrideValue) -> Self {
        match value {
            OverrideValue::Int(v) => ParamOverrideValue::Int(v),
            OverrideValue::Float(v) => ParamOverrideValue::Float(v),
            OverrideValue::Bool(v) => ParamOverrideValue::Bool(v),
        }
    }
}

fn engine(err: impl std::fmt::Display) -> GenerateError {
    GenerateError::Engine(err.to_string())
}

/// Flush a multi-byte character left open when generation stopped mid-way.
fn finish_utf8(decoder: &mut Decoder, out: &mut String) {
    let mut tail = String::with_capacity(decoder.max_utf8_buffer_length(0).unwrap_or(4));
    let _decode_result = decoder.decode_to_string(&[], &mut tail, true);
    out.push_str(&tail);
}

/// A GGUF model run through llama.cpp.
pub struct LlamaGenerator {
    model: LlamaModel,
    backend: LlamaBackend,
    ctx_size: NonZeroU32,
    threads: Option<i32>,
    threads_batch: Option<i32>,
    seed: u32,
}

impl LlamaGenerator {
    pub fn new(args: &Args) -> anyhow::Result<Self> {
        let backend = LlamaBackend::init().context("could not initialize llama backend")?;

        // offload layers to the gpu
        let model_params = {
            if args.n_gpu_layers > 0 {
                LlamaModelParams::default().with_n_gpu_layers(args.n_gpu_layers)
            } else {
                LlamaModelParams::default()
            }
        };

        let mut model_params = pin!(model_params);

        for (k, v) in &args.key_value_overrides {
            let k = CString::new(k.as_bytes()).with_context(|| format!("invalid key: {k}"))?;
            model_params.as_mut().append_kv_override(k.as_c_str(), (*v).into());
        }

        let model_path = args
            .model
            .clone()
            .get_or_load()
            .context("failed to get model from args")?;

        info!("loading model from {}", model_path.display());
        let model = LlamaModel::load_from_file(&backend, &model_path, &model_params)
            .context("unable to load model")?;

        Ok(Self {
            model,
            backend,
            ctx_size: args.ctx_size,
            threads: args.threads,
            threads_batch: args.threads_batch.or(args.threads),
            seed: args.seed,
        })
    }

    fn context_params(&self) -> LlamaContextParams {
        let mut ctx_params = LlamaContextParams::default().with_n_ctx(Some(self.ctx_size));
        if let Some(threads) = self.threads {
            ctx_params = ctx_params.with_n_threads(threads);
        }
        if let Some(threads_batch) = self.threads_batch {
            ctx_params = ctx_params.with_n_threads_batch(threads_batch);
        }
        ctx_params
    }

    fn sampler(&self, params: &GenerationParams) -> LlamaSampler {
        LlamaSampler::chain_simple([
            LlamaSampler::penalties(PENALTY_LAST_N, params.repetition_penalty, 0.0, 0.0),
            LlamaSampler::top_p(params.top_p, 1),
            LlamaSampler::temp(params.temperature),
            LlamaSampler::dist(self.seed),
        ])
    }
}

impl TextGenerator for LlamaGenerator {
    /// Returns the prompt followed by the sampled continuation.
    fn generate(&mut self, prompt: &str, params: &GenerationParams) -> Result<String, GenerateError> {
        let mut ctx = self
            .model
            .new_context(&self.backend, self.context_params())
            .map_err(engine)?;

        let tokens_list = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(engine)?;

        // make sure the KV cache is big enough to hold the prompt and generated tokens
        let n_ctx = ctx.n_ctx() as usize;
        if tokens_list.len() + params.max_new_tokens > n_ctx {
            return Err(GenerateError::PromptTooLong {
                tokens: tokens_list.len(),
                max_new_tokens: params.max_new_tokens,
                n_ctx,
            });
        }

        let mut batch = LlamaBatch::new(n_ctx, 1);

        let last_index = tokens_list.len().saturating_sub(1);
        for (i, token) in tokens_list.into_iter().enumerate() {
            // llama_decode will output logits only for the last token of the prompt
            batch
                .add(token, i as i32, &[0], i == last_index)
                .map_err(engine)?;
        }

        ctx.decode(&mut batch).map_err(engine)?;

        let mut sampler = self.sampler(params);
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut completion = String::from(prompt);
        let mut n_cur = batch.n_tokens();
        let mut n_decode = 0;
        let started = Instant::now();

        while n_decode < params.max_new_tokens {
            let new_token_id = sampler.sample(&ctx, batch.n_tokens() - 1);

            if self.model.is_eog_token(new_token_id) {
                break;
            }

            let output_bytes = self
                .model
                .token_to_bytes(new_token_id, Special::Tokenize)
                .map_err(engine)?;
            let mut output_string = String::with_capacity(32);
            let _decode_result = decoder.decode_to_string(&output_bytes, &mut output_string, false);
            completion.push_str(&output_string);

            batch.clear();
            batch
                .add(new_token_id, n_cur, &[0], true)
                .map_err(engine)?;
            n_cur += 1;

            ctx.decode(&mut batch).map_err(engine)?;
            n_decode += 1;
        }

        finish_utf8(&mut decoder, &mut completion);

        let elapsed = started.elapsed();
        debug!(
            "decoded {} tokens in {:.2} s, speed {:.2} t/s",
            n_decode,
            elapsed.as_secs_f32(),
            n_decode as f32 / elapsed.as_secs_f32().max(f32::EPSILON)
        );

        Ok(completion)
    }
}

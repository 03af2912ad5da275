use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use voxweave::stream::FrameStream;
use voxweave::{PolicyChange, naming, text};
use voxweave_domain::{
    AmbiguousVoice, ArtifactDescriptor, GENERATE_SUCCESS, Language, NarrationRequest, PitchMode,
    SynthesisRequest, TextFiltering, VocalSpeedMod, VoiceError, VoiceId, VoiceIdentity,
};

use crate::AppState;
use crate::error::ServerError;

type ApiResult<T> = Result<T, ServerError>;

fn rejected(message: String) -> ServerError {
    ServerError::Voice(VoiceError::InvalidRequest(message))
}

/// Fields of the form-encoded generation endpoint.
#[derive(Debug, Deserialize)]
pub struct GenerateForm {
    pub text_input: String,
    pub text_filtering: String,
    pub character_voice_gen: String,
    pub narrator_enabled: bool,
    pub narrator_voice_gen: String,
    pub text_not_inside: String,
    pub language: String,
    pub output_file_name: String,
    pub output_file_timestamp: bool,
    #[serde(default)]
    pub streaming: bool,
}

impl GenerateForm {
    fn into_request(self) -> Result<(NarrationRequest, bool), VoiceError> {
        let text_filtering = match self.text_filtering.as_str() {
            "none" => TextFiltering::None,
            "standard" => TextFiltering::Standard,
            "html" => TextFiltering::Html,
            other => {
                return Err(VoiceError::InvalidRequest(format!(
                    "text_filtering must be none, standard or html: {other:?}"
                )));
            }
        };
        let ambiguous_voice = match self.text_not_inside.as_str() {
            "character" => AmbiguousVoice::Character,
            "narrator" => AmbiguousVoice::Narrator,
            other => {
                return Err(VoiceError::InvalidRequest(format!(
                    "text_not_inside must be character or narrator: {other:?}"
                )));
            }
        };
        let request = NarrationRequest {
            text: self.text_input,
            text_filtering,
            character_voice: VoiceId::new(self.character_voice_gen),
            narrator_enabled: self.narrator_enabled,
            narrator_voice: VoiceId::new(self.narrator_voice_gen),
            ambiguous_voice,
            language: Language::parse(&self.language)?,
            output_file_name: self.output_file_name,
            output_file_timestamp: self.output_file_timestamp,
        };
        Ok((request, self.streaming))
    }
}

/// `POST /api/tts-generate`
pub async fn tts_generate(
    State(state): State<AppState>,
    form: Result<Form<GenerateForm>, FormRejection>,
) -> ApiResult<Response> {
    let Form(form) = form.map_err(|e| rejected(e.body_text()))?;
    let (request, streaming) = form.into_request()?;

    if streaming {
        request.validate(state.service.config().synthesis.max_text_chars)?;
        if request.narrator_enabled {
            return Err(rejected("streaming is not available with narration".into()));
        }
        let text = text::apply_filtering(request.text_filtering, &request.text);
        let synth = SynthesisRequest::new(text, VoiceIdentity::Single(request.character_voice))
            .with_language(request.language)
            .streaming(true);
        let frames = state.service.stream(synth).await?;
        return wav_stream(frames).await;
    }

    let artifact = state.service.narrate(request).await?;
    let descriptor = ArtifactDescriptor::for_artifact(&artifact, &state.base_url);
    Ok(Json(descriptor).into_response())
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub text: String,
    pub voice: String,
    pub language: String,
    /// Accepted for compatibility; streamed audio is not written to disk.
    #[serde(default)]
    pub output_file: Option<String>,
}

/// `GET /api/tts-generate-streaming`
pub async fn tts_generate_streaming(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query.map_err(|e| rejected(e.body_text()))?;
    if let Some(name) = &query.output_file {
        debug!(output_file = %name, "ignoring output_file for streamed request");
    }
    let request = SynthesisRequest::new(query.text, VoiceIdentity::single(query.voice))
        .with_language(Language::parse(&query.language)?)
        .streaming(true);
    let frames = state.service.stream(request).await?;
    wav_stream(frames).await
}

/// Wait for the first frame so setup failures still get a JSON error,
/// then hand the rest to the client as it arrives.
async fn wav_stream(mut frames: FrameStream) -> ApiResult<Response> {
    let first = match frames.next().await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => return Err(e.into()),
        None => {
            return Err(VoiceError::SynthesisFailed("stream ended before any audio".into()).into());
        }
    };
    let body = futures::stream::once(async move { Ok(first) }).chain(frames);
    Ok((
        [(header::CONTENT_TYPE, "audio/wav")],
        Body::from_stream(body),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct BlendedRequest {
    pub text: String,
    pub voices: Vec<String>,
    pub weights: Vec<f32>,
    #[serde(default)]
    pub pitch: i32,
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub pitch_mode: Option<PitchMode>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedResponse {
    pub status: &'static str,
    pub data: AudioPath,
}

#[derive(Debug, Serialize)]
pub struct AudioPath {
    pub audio_path: String,
}

/// `POST /api/v1/tts`
pub async fn tts_v1(
    State(state): State<AppState>,
    body: Result<Json<BlendedRequest>, JsonRejection>,
) -> ApiResult<Json<GeneratedResponse>> {
    let Json(body) = body.map_err(|e| rejected(e.body_text()))?;
    let identity = VoiceIdentity::from_parts(body.voices, body.weights)?;
    let request = SynthesisRequest::new(body.text, identity)
        .with_speed(VocalSpeedMod(body.speed).normalized())
        .with_pitch(state.service.pitch_shift(body.pitch, body.pitch_mode));

    let name = naming::random_output_name();
    let artifact = state.service.generate(request, &name).await?;
    info!(file = %artifact.file_name(), "blended synthesis done");
    Ok(Json(GeneratedResponse::for_file(artifact.file_name())))
}

impl GeneratedResponse {
    fn for_file(audio_path: String) -> Self {
        Self {
            status: GENERATE_SUCCESS,
            data: AudioPath { audio_path },
        }
    }
}

/// Caller-chosen output names gain a `.wav` suffix when they lack one.
fn wav_file_name(name: &str) -> String {
    if name.ends_with(".wav") {
        name.to_string()
    } else {
        format!("{name}.wav")
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateJson {
    pub text: String,
    pub voice: String,
    pub language: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    pub output_file: String,
}

/// `POST /api/generate`: one voice, caller-chosen decoding knobs and file.
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateJson>, JsonRejection>,
) -> ApiResult<Json<GeneratedResponse>> {
    let Json(body) = body.map_err(|e| rejected(e.body_text()))?;
    let mut request = SynthesisRequest::new(body.text, VoiceIdentity::single(body.voice))
        .with_language(Language::parse(&body.language)?);
    request.temperature = body.temperature;
    request.repetition_penalty = body.repetition_penalty;

    let artifact = state
        .service
        .generate(request, &wav_file_name(&body.output_file))
        .await?;
    Ok(Json(GeneratedResponse::for_file(artifact.file_name())))
}

#[derive(Debug, Deserialize)]
pub struct StreamForm {
    pub text: String,
    pub voice: String,
    pub language: String,
    pub output_file: String,
}

/// `POST /api/tts-generate-streaming`: the form variant writes the whole
/// file before answering.
pub async fn tts_generate_streaming_form(
    State(state): State<AppState>,
    form: Result<Form<StreamForm>, FormRejection>,
) -> ApiResult<Json<Value>> {
    let Form(form) = form.map_err(|e| rejected(e.body_text()))?;
    let request = SynthesisRequest::new(form.text, VoiceIdentity::single(form.voice))
        .with_language(Language::parse(&form.language)?);
    let artifact = state
        .service
        .generate(request, &wav_file_name(&form.output_file))
        .await?;
    Ok(Json(json!({ "output_file_path": artifact.file_name() })))
}

#[derive(Debug, Deserialize)]
pub struct PreviewForm {
    pub voice: String,
}

const PREVIEW_FILE: &str = "api_preview_voice.wav";

/// Spoken name of a voice file: extension dropped, punctuation as spaces.
fn preview_sentence(voice: &str) -> String {
    let stem = voice.replace(' ', "_");
    let stem = stem.strip_suffix(".wav").unwrap_or(&stem);
    let spoken: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    format!("Hello, this is a preview of voice {spoken}.")
}

/// `POST /api/previewvoice/`
pub async fn preview_voice(
    State(state): State<AppState>,
    form: Result<Form<PreviewForm>, FormRejection>,
) -> ApiResult<Json<ArtifactDescriptor>> {
    let Form(form) = form.map_err(|e| rejected(e.body_text()))?;
    let request = SynthesisRequest::new(
        preview_sentence(&form.voice),
        VoiceIdentity::single(form.voice),
    )
    .with_language(Language::ENGLISH);
    let artifact = state.service.generate(request, PREVIEW_FILE).await?;
    Ok(Json(ArtifactDescriptor::for_artifact(&artifact, &state.base_url)))
}

/// `GET /api/voices`
pub async fn voices(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let voices = state.service.list_voices()?;
    Ok(Json(json!({ "voices": voices })))
}

/// Resolve `name` inside the output directory, refusing anything that
/// could leave it or reach in-flight files.
fn output_file(state: &AppState, name: &str) -> ApiResult<PathBuf> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0']);
    let path = state.service.output_dir().join(name);
    if plain && path.is_file() {
        Ok(path)
    } else {
        Err(ServerError::FileNotFound(name.to_string()))
    }
}

async fn read_output(path: &std::path::Path, name: &str) -> ApiResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|_| ServerError::FileNotFound(name.to_string()))
}

/// `GET /audio/{filename}`
pub async fn audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = output_file(&state, &filename)?;
    let bytes = read_output(&path, &filename).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response())
}

/// `GET /audiocache/{filename}`: like `/audio` but cacheable for a week,
/// with the file's modification time as its entity tag.
pub async fn audio_cache(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = output_file(&state, &filename)?;
    let modified = tokio::fs::metadata(&path)
        .await
        .and_then(|m| m.modified())
        .map_err(|_| ServerError::FileNotFound(filename.clone()))?;
    let mtime = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    let etag = format!("\"{mtime}\"");

    let cache_headers = [
        (header::CACHE_CONTROL, "public, max-age=604800".to_string()),
        (header::ETAG, etag.clone()),
    ];
    let fresh = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if fresh {
        return Ok((StatusCode::NOT_MODIFIED, cache_headers).into_response());
    }

    let bytes = read_output(&path, &filename).await?;
    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));
    Ok((
        cache_headers,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("audio/wav")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct LowVramQuery {
    pub new_low_vram_value: bool,
}

/// `POST /api/lowvramsetting?new_low_vram_value=bool`
pub async fn low_vram_setting(
    State(state): State<AppState>,
    query: Result<Query<LowVramQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query.map_err(|e| rejected(e.body_text()))?;
    let enabled = query.new_low_vram_value;
    let word = if enabled { "enabled" } else { "disabled" };
    let change = state.service.set_low_resource(enabled).await?;
    let body = match change {
        PolicyChange::AlreadySet => json!({
            "status": "success",
            "message": format!("low-resource mode is already {word}"),
        }),
        PolicyChange::Applied { residency } => json!({
            "status": "success",
            "message": format!("low-resource mode {word}"),
            "residency": residency,
        }),
    };
    Ok(Json(body))
}

/// `GET /api/currentsettings`
pub async fn current_settings(State(state): State<AppState>) -> Json<Value> {
    let residency = state.service.residency();
    let status = residency.status();
    let config = state.service.config();
    let languages: Vec<String> = Language::SUPPORTED.iter().map(|l| l.to_string()).collect();
    Json(json!({
        "current_model_loaded": residency.engine_name(),
        "low_vram_status": status.policy.is_low_resource(),
        "residency": status.residency,
        "gpu_available": status.gpu_available,
        "blend_mode": config.blend.mode,
        "pitch_mode": config.pitch.default_mode,
        "languages": languages,
        "voice_library": state.service.store().library_names(),
    }))
}

//! API route definitions.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::dispatch::Command;
use crate::history::{RunEntry, RunHandle, RunStatus};
use crate::mechanism::{
    MechanismAttribute, MechanismState, Outcome, ParseMechanismError, PendingTransition, Position,
    TransitionHandle,
};
use crate::panel::display::{self, DisplayConfig, HistoryRow, StatusRow};
use crate::panel::Resolution;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/layout", get(layout))
        .route("/panel", get(panel_view))
        .route("/mechanisms", get(list_mechanisms))
        .route("/mechanisms/{attribute}", get(get_mechanism))
        .route("/commands", post(issue_command))
        .route("/transitions", get(list_transitions))
        .route("/transitions/{id}/resolve", post(resolve_transition))
        .route("/runs", get(list_runs).post(start_run))
        .route("/runs/command", post(start_run_command))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/elapsed", post(update_elapsed))
        .route("/runs/{id}/finish", post(finish_run))
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Envelope<T> {
    data: T,
    meta: Meta,
}

#[derive(Debug, Serialize)]
struct Meta {
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<usize>,
    /// Set on run writes: whether the change reached the history store.
    #[serde(skip_serializing_if = "Option::is_none")]
    persisted: Option<bool>,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        data,
        meta: Meta {
            timestamp: Utc::now().to_rfc3339(),
            total: None,
            persisted: None,
        },
    })
}

fn written<T: Serialize>(data: T, persisted: bool) -> Json<Envelope<T>> {
    let mut json = ok(data);
    json.0.meta.persisted = Some(persisted);
    json
}

fn ok_list<T: Serialize>(data: Vec<T>) -> Json<Envelope<Vec<T>>> {
    let total = data.len();
    let mut json = ok(data);
    json.0.meta.total = Some(total);
    json
}

// ---------------------------------------------------------------------------
// Panel
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Envelope<Health>> {
    ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn layout(State(state): State<AppState>) -> Json<Envelope<DisplayConfig>> {
    ok(state.display.as_ref().clone())
}

#[derive(Debug, Serialize)]
struct PanelView {
    title: String,
    navigation: Vec<String>,
    rows: Vec<StatusRow>,
    history_columns: Vec<String>,
    history: Vec<HistoryRow>,
    current_run: Option<RunHandle>,
}

/// Display-ready panel, built from one consistent snapshot.
async fn panel_view(State(state): State<AppState>) -> Json<Envelope<PanelView>> {
    let snap = state.panel.snapshot();
    let cfg = &state.display;
    let records: Vec<_> = snap.runs.iter().map(|e| e.record.clone()).collect();

    ok(PanelView {
        title: cfg.title.clone(),
        navigation: cfg.navigation.clone(),
        rows: display::status_rows(cfg, &snap.mechanisms),
        history_columns: cfg.history_columns.clone(),
        history: display::history_rows(&records, cfg.history_rows),
        current_run: snap.current_run,
    })
}

// ---------------------------------------------------------------------------
// Mechanisms and commands
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MechanismView {
    attribute: MechanismAttribute,
    state: MechanismState,
}

async fn list_mechanisms(State(state): State<AppState>) -> Json<Envelope<Vec<MechanismView>>> {
    let snap = state.panel.mechanisms();
    ok_list(
        snap.states
            .into_iter()
            .map(|(attribute, state)| MechanismView { attribute, state })
            .collect(),
    )
}

async fn get_mechanism(
    State(state): State<AppState>,
    Path(attribute): Path<String>,
) -> Result<Json<Envelope<MechanismView>>, ApiError> {
    let attribute: MechanismAttribute = attribute
        .parse()
        .map_err(|e: ParseMechanismError| ApiError::NotFound(e.to_string()))?;
    Ok(ok(MechanismView {
        attribute,
        state: state.panel.get(attribute),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandRequest {
    Named { command: Command },
    Explicit { attribute: MechanismAttribute, target: Position },
}

#[derive(Debug, Serialize)]
struct Issued {
    handle: TransitionHandle,
    attribute: MechanismAttribute,
    target: Position,
}

async fn issue_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<(StatusCode, Json<Envelope<Issued>>), ApiError> {
    let (attribute, target) = match req {
        CommandRequest::Named { command } => (command.attribute(), command.target()),
        CommandRequest::Explicit { attribute, target } => (attribute, target),
    };
    let handle = state.panel.issue(attribute, target)?;
    Ok((
        StatusCode::ACCEPTED,
        ok(Issued {
            handle,
            attribute,
            target,
        }),
    ))
}

async fn list_transitions(State(state): State<AppState>) -> Json<Envelope<Vec<PendingTransition>>> {
    ok_list(state.panel.pending())
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    outcome: Outcome,
}

async fn resolve_transition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<Envelope<Resolution>>, ApiError> {
    let (resolution, persisted) = state.write_run(|panel| {
        let resolution = panel.resolve_transition(TransitionHandle::from(id), req.outcome)?;
        let run = resolution.finished_run;
        Ok((resolution, run))
    })?;
    Ok(written(resolution, persisted))
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    /// `newest` for display order; insertion order otherwise.
    order: Option<String>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(q): Query<ListRunsQuery>,
) -> Json<Envelope<Vec<RunEntry>>> {
    let mut runs = state.panel.run_entries();
    if q.order.as_deref() == Some("newest") {
        runs.reverse();
    }
    ok_list(runs)
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<RunEntry>>, ApiError> {
    run_response(&state, RunHandle::from(id))
}

#[derive(Debug, Deserialize)]
struct StartRunRequest {
    test_name: String,
    start_time: Option<DateTime<Utc>>,
}

async fn start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<Envelope<RunEntry>>), ApiError> {
    let start = req.start_time.unwrap_or_else(Utc::now);
    let (handle, persisted) = state.write_run(|panel| {
        let handle = panel.start_run(req.test_name, start)?;
        Ok((handle, Some(handle)))
    })?;
    written_run(&state, handle, persisted).map(|json| (StatusCode::CREATED, json))
}

#[derive(Debug, Deserialize)]
struct RunCommandRequest {
    test_name: String,
    command: Command,
    start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct RunCommandStarted {
    transition: TransitionHandle,
    run: RunEntry,
}

async fn start_run_command(
    State(state): State<AppState>,
    Json(req): Json<RunCommandRequest>,
) -> Result<(StatusCode, Json<Envelope<RunCommandStarted>>), ApiError> {
    let start = req.start_time.unwrap_or_else(Utc::now);
    let ((transition, handle), persisted) = state.write_run(|panel| {
        let (transition, run) = panel.issue_run_command(req.test_name, start, req.command)?;
        Ok(((transition, run), Some(run)))
    })?;
    let run = state
        .panel
        .run(handle)
        .ok_or_else(|| ApiError::NotFound(format!("no run with handle {}", handle)))?;
    Ok((
        StatusCode::CREATED,
        written(RunCommandStarted { transition, run }, persisted),
    ))
}

#[derive(Debug, Deserialize)]
struct ElapsedRequest {
    elapsed_secs: f64,
}

async fn update_elapsed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ElapsedRequest>,
) -> Result<Json<Envelope<RunEntry>>, ApiError> {
    let handle = RunHandle::from(id);
    // Negative values clamp to zero; values a `Duration` cannot hold are refused.
    let elapsed = Duration::try_from_secs_f64(req.elapsed_secs.max(0.0)).map_err(|_| {
        ApiError::InvalidRequest(format!(
            "elapsed time {} s is out of range",
            req.elapsed_secs
        ))
    })?;
    let ((), persisted) = state.write_run(|panel| {
        panel.update_elapsed(handle, elapsed)?;
        Ok(((), Some(handle)))
    })?;
    written_run(&state, handle, persisted)
}

#[derive(Debug, Deserialize)]
struct FinishRequest {
    status: RunStatus,
}

async fn finish_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FinishRequest>,
) -> Result<Json<Envelope<RunEntry>>, ApiError> {
    let handle = RunHandle::from(id);
    let ((), persisted) = state.write_run(|panel| {
        panel.finish_run(handle, req.status)?;
        Ok(((), Some(handle)))
    })?;
    written_run(&state, handle, persisted)
}

fn run_response(state: &AppState, handle: RunHandle) -> Result<Json<Envelope<RunEntry>>, ApiError> {
    state
        .panel
        .run(handle)
        .map(ok)
        .ok_or_else(|| ApiError::NotFound(format!("no run with handle {}", handle)))
}

fn written_run(
    state: &AppState,
    handle: RunHandle,
    persisted: bool,
) -> Result<Json<Envelope<RunEntry>>, ApiError> {
    state
        .panel
        .run(handle)
        .map(|entry| written(entry, persisted))
        .ok_or_else(|| ApiError::NotFound(format!("no run with handle {}", handle)))
}

mod app;
mod data;
mod route;
mod terminal;
mod theme;
mod ui;

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::{self, KeyEventKind};
use serde_json::Value;

use crate::activation;
use crate::diagnostics;
use crate::error::AppError;
use crate::form::Commit;
use crate::probe::{self, HttpProbe, ProbePlan, ProbeResult, DEFAULT_PROBE_TIMEOUT};
use crate::rules::MODEL_FIELD;
use crate::schema::{ModelListing, SchemaAuthority, SchemaSet};
use crate::settings::{get_settings, update_settings};

use app::{Action, App, ToastKind, UiFlags};
use data::{Loadable, UiData};
use route::Route;
use terminal::{PanicRestoreHookGuard, TuiTerminal};

#[derive(Debug, Clone)]
pub struct TuiOptions {
    pub catalog_path: PathBuf,
    pub cwd: PathBuf,
    pub authority: SchemaAuthority,
    pub use_alt: bool,
    pub once: bool,
    pub probe_timeout: Duration,
}

impl TuiOptions {
    pub fn new(catalog_path: PathBuf, cwd: PathBuf, authority: SchemaAuthority) -> Self {
        Self {
            catalog_path,
            cwd,
            authority,
            use_alt: true,
            once: false,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaReq {
    Types,
    Models,
}

enum SchemaMsg {
    Types(Result<SchemaSet, String>),
    Models(Result<ModelListing, String>),
}

impl SchemaMsg {
    fn failed(req: SchemaReq, err: String) -> Self {
        match req {
            SchemaReq::Types => SchemaMsg::Types(Err(err)),
            SchemaReq::Models => SchemaMsg::Models(Err(err)),
        }
    }
}

#[derive(Debug, Clone)]
struct ProbeReq {
    token: u64,
    provider_id: String,
    probe: HttpProbe,
}

struct ProbeMsg {
    token: u64,
    provider_id: String,
    result: ProbeResult,
}

struct SchemaSystem {
    req_tx: mpsc::Sender<SchemaReq>,
    result_rx: mpsc::Receiver<SchemaMsg>,
    _handle: std::thread::JoinHandle<()>,
}

struct ProbeSystem {
    req_tx: mpsc::Sender<ProbeReq>,
    result_rx: mpsc::Receiver<ProbeMsg>,
    _handle: std::thread::JoinHandle<()>,
}

fn poll_error(source: std::io::Error) -> AppError {
    AppError::IoContext {
        context: "terminal error: event".to_string(),
        source,
    }
}

pub fn run(opts: TuiOptions) -> Result<(), AppError> {
    let _panic_hook = PanicRestoreHookGuard::install(opts.use_alt);
    let mut terminal = TuiTerminal::new(opts.use_alt)?;
    let mut app = App::new(UiFlags::from(&get_settings()));
    let (mut data, warning) = UiData::load(&opts.catalog_path, &opts.cwd)?;
    if let Some(warning) = warning {
        app.push_toast(warning, ToastKind::Warning);
    }

    if opts.once {
        terminal.draw(|f| ui::render(f, &app, &data))?;
        return Ok(());
    }

    let schema = match start_schema_system(opts.authority.clone()) {
        Ok(system) => Some(system),
        Err(err) => {
            log::warn!("{err}");
            app.push_toast(format!("Schema worker unavailable: {err}"), ToastKind::Warning);
            None
        }
    };

    let prober = match start_probe_system(opts.probe_timeout) {
        Ok(system) => Some(system),
        Err(err) => {
            log::warn!("{err}");
            app.push_toast(format!("Probe worker unavailable: {err}"), ToastKind::Warning);
            None
        }
    };

    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui::render(f, &app, &data))?;

        if let Some(schema) = schema.as_ref() {
            while let Ok(msg) = schema.result_rx.try_recv() {
                handle_schema_msg(&mut app, &mut data, msg);
            }
        }

        if let Some(prober) = prober.as_ref() {
            while let Ok(msg) = prober.result_rx.try_recv() {
                handle_probe_msg(&mut app, &mut data, msg);
            }
        }

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).map_err(poll_error)? {
            match event::read().map_err(poll_error)? {
                event::Event::Key(key) if key.kind == KeyEventKind::Press => {
                    let action = app.on_key(key, &data);
                    if let Err(err) = handle_action(
                        &mut app,
                        &mut data,
                        schema.as_ref().map(|s| &s.req_tx),
                        prober.as_ref().map(|s| &s.req_tx),
                        action,
                    ) {
                        if err.is_fatal() {
                            return Err(err);
                        }
                        log::warn!("{err}");
                        let kind = match err {
                            AppError::Validation(_) | AppError::InvalidInput(_) => ToastKind::Warning,
                            _ => ToastKind::Error,
                        };
                        app.push_toast(err.to_string(), kind);
                    }
                }
                event::Event::Resize(_, _) => {}
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn request_schema(
    tx: Option<&mpsc::Sender<SchemaReq>>,
    req: SchemaReq,
) -> Result<(), String> {
    let Some(tx) = tx else {
        return Err("schema worker unavailable".to_string());
    };
    tx.send(req).map_err(|e| format!("schema worker stopped: {e}"))
}

/// Starts whatever background work the page on top of the stack needs and
/// has not requested yet.
fn ensure_loaded(app: &mut App, data: &mut UiData, schema_tx: Option<&mpsc::Sender<SchemaReq>>) {
    let route = app.route().clone();

    if route.needs_schema() && !data.schemas.is_requested() {
        data.schemas = match request_schema(schema_tx, SchemaReq::Types) {
            Ok(()) => Loadable::Loading,
            Err(err) => {
                app.push_toast(format!("Provider types unavailable: {err}"), ToastKind::Warning);
                Loadable::Failed(err)
            }
        };
    }

    if route == Route::Models && !data.models.is_requested() {
        data.models = match request_schema(schema_tx, SchemaReq::Models) {
            Ok(()) => Loadable::Loading,
            Err(err) => Loadable::Failed(err),
        };
    }

    if route == Route::Diagnostics && data.diagnostics.is_none() {
        data.diagnostics = Some(diagnostics::collect(&data.cwd, Some(&data.catalog)));
    }
}

fn handle_action(
    app: &mut App,
    data: &mut UiData,
    schema_tx: Option<&mpsc::Sender<SchemaReq>>,
    probe_tx: Option<&mpsc::Sender<ProbeReq>>,
    action: Action,
) -> Result<(), AppError> {
    match action {
        Action::None | Action::Quit => Ok(()),
        Action::Navigated => {
            ensure_loaded(app, data, schema_tx);
            Ok(())
        }
        Action::SaveCatalog => {
            let missing = data
                .schemas
                .ready()
                .map(|s| data.catalog.missing_required(s))
                .unwrap_or(0);
            data.catalog.save(&data.catalog_path, data.schemas.ready())?;
            let saved = format!(
                "Saved {} provider(s) to {}",
                data.catalog.len(),
                data.catalog_file_name()
            );
            if missing > 0 {
                app.push_toast(
                    format!("{saved}; {missing} required field(s) still empty"),
                    ToastKind::Warning,
                );
            } else {
                app.push_toast(saved, ToastKind::Success);
            }
            Ok(())
        }
        Action::AddProvider { provider_type } => {
            let schema = data.schemas.ready().and_then(|s| s.get(&provider_type));
            let id = data.catalog.add(&provider_type, schema);
            if let Some(idx) = data.catalog.position(&id) {
                app.provider_idx = idx;
            }
            app.push_toast(format!("Added {provider_type} provider {id}"), ToastKind::Success);
            let action = app.open_form(&id);
            handle_action(app, data, schema_tx, probe_tx, action)
        }
        Action::DeleteProvider { id } => {
            let removed = data.catalog.delete(&id)?;
            data.probe_results.remove(&id);
            app.pages
                .remove_where(|r| matches!(r, Route::ProviderForm { id: form_id } if *form_id == id));
            if app
                .active_probe
                .as_ref()
                .is_some_and(|p| p.provider_id == id)
            {
                app.active_probe = None;
            }
            if app.build_override.as_deref() == Some(id.as_str()) {
                app.build_override = None;
            }
            app.push_toast(format!("Deleted {}", removed.name), ToastKind::Info);
            Ok(())
        }
        Action::SetDefault { id } => {
            data.catalog.set_default(&id)?;
            let name = data
                .catalog
                .get(&id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| id.clone());
            app.push_toast(
                format!("Default provider: {name} (press s to save)"),
                ToastKind::Success,
            );
            Ok(())
        }
        Action::Commit(commit) => apply_commit(app, data, commit),
        Action::Probe { id } => start_probe(app, data, probe_tx, &id),
        Action::ApplyModel { model_id } => {
            let provider = data
                .catalog
                .default_provider()
                .ok_or_else(|| AppError::Validation("no default provider selected".to_string()))?;
            let (provider_id, provider_name) = (provider.id.clone(), provider.name.clone());

            let ram_warning = data.models.ready().and_then(|listing| {
                let needed = listing
                    .models
                    .iter()
                    .find(|m| m.id == model_id)?
                    .recommended_ram_gb?;
                let available = listing.available_ram_gb?;
                (needed > available).then(|| {
                    format!("{model_id} recommends {needed:.1} GB RAM, {available:.1} GB available")
                })
            });

            data.catalog
                .update(&provider_id, MODEL_FIELD, Value::String(model_id.clone()))?;
            match ram_warning {
                Some(warning) => app.push_toast(warning, ToastKind::Warning),
                None => app.push_toast(
                    format!("{provider_name}: model set to {model_id}"),
                    ToastKind::Success,
                ),
            }
            Ok(())
        }
        Action::WriteActivation {
            target,
            override_id,
        } => {
            let path = activation::write(&data.catalog, override_id.as_deref(), target, &data.cwd)?;
            app.push_toast(format!("Wrote {}", path.display()), ToastKind::Success);
            data.last_write = Some(path);
            Ok(())
        }
        Action::RefreshModels => {
            data.models = Loadable::NotRequested;
            ensure_loaded(app, data, schema_tx);
            Ok(())
        }
        Action::RefreshDiagnostics => {
            data.diagnostics = Some(diagnostics::collect(&data.cwd, Some(&data.catalog)));
            app.push_toast("Diagnostics refreshed", ToastKind::Info);
            Ok(())
        }
        Action::ExportDiagnostics => {
            let diag = diagnostics::collect(&data.cwd, Some(&data.catalog));
            let path = diagnostics::export(&diag, None, &data.cwd)?;
            data.diagnostics = Some(diag);
            app.push_toast(format!("Exported {}", path.display()), ToastKind::Success);
            data.last_export = Some(path);
            Ok(())
        }
        Action::PersistSettings => {
            update_settings(app.flags.to_settings())?;
            app.push_toast(
                format!(
                    "Theme {} · animation {}",
                    app.flags.theme.label(),
                    if app.flags.animation { "on" } else { "off" }
                ),
                ToastKind::Info,
            );
            Ok(())
        }
    }
}

fn apply_commit(app: &mut App, data: &mut UiData, commit: Commit) -> Result<(), AppError> {
    match commit {
        Commit::Rename { id, name } => {
            data.catalog.rename(&id, &name)?;
        }
        Commit::Field {
            id,
            field,
            value,
            warning,
        } => {
            data.catalog.update(&id, &field, value)?;
            if let Some(warning) = warning {
                app.push_toast(warning, ToastKind::Warning);
            }
        }
        Commit::Tags { id, tags } => {
            data.catalog.set_tags(&id, tags)?;
        }
    }
    Ok(())
}

/// Plans a probe on the loop and hands any network work to the worker.
/// Gated probes fail here and never reach the worker.
fn start_probe(
    app: &mut App,
    data: &mut UiData,
    probe_tx: Option<&mpsc::Sender<ProbeReq>>,
    id: &str,
) -> Result<(), AppError> {
    let provider = data
        .catalog
        .get(id)
        .ok_or_else(|| AppError::InvalidInput(format!("unknown provider id '{id}'")))?;
    let schema = data.schemas.ready().and_then(|s| s.get(&provider.provider_type));
    let name = provider.name.clone();

    match probe::plan(provider, schema)? {
        ProbePlan::Immediate(result) => {
            app.push_toast(result.summary(), ToastKind::Info);
            data.probe_results.insert(id.to_string(), result);
            Ok(())
        }
        ProbePlan::Http(http) => {
            let tx = probe_tx
                .ok_or_else(|| AppError::Message("probe worker unavailable".to_string()))?;
            let token = app.begin_probe(id);
            log::debug!("probe #{token} for {id} -> {}", http.url);
            let req = ProbeReq {
                token,
                provider_id: id.to_string(),
                probe: http,
            };
            if let Err(e) = tx.send(req) {
                app.active_probe = None;
                return Err(AppError::Message(format!("probe worker stopped: {e}")));
            }
            data.probe_results.remove(id);
            app.push_toast(format!("Testing {name}…"), ToastKind::Info);
            Ok(())
        }
    }
}

fn handle_schema_msg(app: &mut App, data: &mut UiData, msg: SchemaMsg) {
    match msg {
        SchemaMsg::Types(Ok(set)) => {
            if set.is_empty() {
                log::warn!("schema authority returned no provider types");
            }
            data.schemas = Loadable::Ready(set);
        }
        SchemaMsg::Types(Err(err)) => {
            app.push_toast(format!("{err}; adding providers is disabled"), ToastKind::Warning);
            data.schemas = Loadable::Failed(err);
        }
        SchemaMsg::Models(Ok(listing)) => {
            data.models = Loadable::Ready(listing);
        }
        SchemaMsg::Models(Err(err)) => {
            app.push_toast(format!("Model listing: {err}"), ToastKind::Warning);
            data.models = Loadable::Failed(err);
        }
    }
}

fn handle_probe_msg(app: &mut App, data: &mut UiData, msg: ProbeMsg) {
    if !app.finish_probe(msg.token) {
        log::debug!(
            "discarding stale probe #{} for {}",
            msg.token,
            msg.provider_id
        );
        return;
    }
    let name = data
        .catalog
        .get(&msg.provider_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| msg.provider_id.clone());
    let kind = if msg.result.ok {
        ToastKind::Success
    } else {
        ToastKind::Error
    };
    app.push_toast(format!("{name}: {}", msg.result.summary()), kind);
    data.probe_results.insert(msg.provider_id, msg.result);
}

fn start_schema_system(authority: SchemaAuthority) -> Result<SchemaSystem, AppError> {
    let (result_tx, result_rx) = mpsc::channel::<SchemaMsg>();
    let (req_tx, req_rx) = mpsc::channel::<SchemaReq>();

    let handle = std::thread::Builder::new()
        .name("chi-tui-schema".to_string())
        .spawn(move || schema_worker_loop(authority, req_rx, result_tx))
        .map_err(|e| AppError::IoContext {
            context: "failed to spawn schema worker thread".to_string(),
            source: e,
        })?;

    Ok(SchemaSystem {
        req_tx,
        result_rx,
        _handle: handle,
    })
}

fn schema_worker_loop(
    authority: SchemaAuthority,
    rx: mpsc::Receiver<SchemaReq>,
    tx: mpsc::Sender<SchemaMsg>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let err = e.to_string();
            log::warn!("schema worker runtime failed: {err}");
            while let Ok(req) = rx.recv() {
                let _ = tx.send(SchemaMsg::failed(req, err.clone()));
            }
            return;
        }
    };

    while let Ok(req) = rx.recv() {
        let msg = match req {
            SchemaReq::Types => {
                SchemaMsg::Types(rt.block_on(authority.fetch_types()).map_err(|e| e.to_string()))
            }
            SchemaReq::Models => {
                SchemaMsg::Models(rt.block_on(authority.fetch_models()).map_err(|e| e.to_string()))
            }
        };
        if let SchemaMsg::Types(Err(err)) | SchemaMsg::Models(Err(err)) = &msg {
            log::warn!("{err}");
        }
        if tx.send(msg).is_err() {
            break;
        }
    }
}

fn start_probe_system(timeout: Duration) -> Result<ProbeSystem, AppError> {
    let (result_tx, result_rx) = mpsc::channel::<ProbeMsg>();
    let (req_tx, req_rx) = mpsc::channel::<ProbeReq>();

    let handle = std::thread::Builder::new()
        .name("chi-tui-probe".to_string())
        .spawn(move || probe_worker_loop(timeout, req_rx, result_tx))
        .map_err(|e| AppError::IoContext {
            context: "failed to spawn probe worker thread".to_string(),
            source: e,
        })?;

    Ok(ProbeSystem {
        req_tx,
        result_rx,
        _handle: handle,
    })
}

/// Older queued requests are superseded by the newest one; their tokens are
/// already stale on the loop side.
fn drain_latest_probe_req(mut req: ProbeReq, rx: &mpsc::Receiver<ProbeReq>) -> ProbeReq {
    for next in rx.try_iter() {
        req = next;
    }
    req
}

fn refuse_probes(rx: mpsc::Receiver<ProbeReq>, tx: mpsc::Sender<ProbeMsg>, err: String) {
    while let Ok(req) = rx.recv() {
        let _ = tx.send(ProbeMsg {
            token: req.token,
            provider_id: req.provider_id,
            result: ProbeResult {
                ok: false,
                status: None,
                latency: None,
                message: err.clone(),
            },
        });
    }
}

fn probe_worker_loop(timeout: Duration, rx: mpsc::Receiver<ProbeReq>, tx: mpsc::Sender<ProbeMsg>) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::warn!("probe worker runtime failed: {e}");
            refuse_probes(rx, tx, e.to_string());
            return;
        }
    };
    let client = match probe::build_client(timeout) {
        Ok(client) => client,
        Err(e) => {
            log::warn!("{e}");
            refuse_probes(rx, tx, e.to_string());
            return;
        }
    };

    while let Ok(req) = rx.recv() {
        let req = drain_latest_probe_req(req, &rx);
        let result = rt.block_on(probe::execute(&client, &req.probe, timeout));
        log::debug!(
            "probe #{} for {} finished: ok={} {}",
            req.token,
            req.provider_id,
            result.ok,
            result.message
        );
        let msg = ProbeMsg {
            token: req.token,
            provider_id: req.provider_id,
            result,
        };
        if tx.send(msg).is_err() {
            break;
        }
    }
}

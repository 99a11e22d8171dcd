use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::activation::Target;
use crate::catalog::Provider;
use crate::form::{form_rows, Commit, Dropdown, FieldEdit, RowTarget};
use crate::schema::ModelEntry;
use crate::settings::{ThemeMode, UiSettings};

use super::data::{Loadable, UiData};
use super::route::{PageStack, Route, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
    pub remaining_ticks: u16,
}

impl Toast {
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            remaining_ticks: 12,
        }
    }
}

/// Presentation switches threaded into rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiFlags {
    pub theme: ThemeMode,
    pub animation: bool,
}

impl Default for UiFlags {
    fn default() -> Self {
        Self::from(&UiSettings::default())
    }
}

impl From<&UiSettings> for UiFlags {
    fn from(settings: &UiSettings) -> Self {
        Self {
            theme: settings.theme,
            animation: settings.animation,
        }
    }
}

impl UiFlags {
    pub fn to_settings(self) -> UiSettings {
        UiSettings {
            theme: self.theme,
            animation: self.animation,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfirmAction {
    DeleteProvider { id: String },
}

#[derive(Debug, Clone)]
pub struct ConfirmOverlay {
    pub title: String,
    pub message: String,
    pub action: ConfirmAction,
}

#[derive(Debug, Clone)]
pub struct AddModeState {
    pub types: Vec<String>,
    pub cursor: usize,
}

#[derive(Debug, Clone)]
pub enum Overlay {
    None,
    Help,
    Dropdown(Dropdown),
    FieldEdit(FieldEdit),
    TagEdit(FieldEdit),
    AddMode(AddModeState),
    Confirm(ConfirmOverlay),
}

impl Overlay {
    pub fn is_active(&self) -> bool {
        !matches!(self, Overlay::None)
    }

    /// Text-capturing overlays swallow every key, global ones included.
    pub fn captures_text(&self) -> bool {
        matches!(self, Overlay::FieldEdit(_) | Overlay::TagEdit(_))
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    None,
    Quit,
    /// The page stack changed; the loop fetches whatever the new page needs.
    Navigated,
    SaveCatalog,
    AddProvider {
        provider_type: String,
    },
    DeleteProvider {
        id: String,
    },
    SetDefault {
        id: String,
    },
    Commit(Commit),
    Probe {
        id: String,
    },
    ApplyModel {
        model_id: String,
    },
    WriteActivation {
        target: Target,
        override_id: Option<String>,
    },
    RefreshModels,
    RefreshDiagnostics,
    ExportDiagnostics,
    PersistSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveProbe {
    pub token: u64,
    pub provider_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsItem {
    Theme,
    Animation,
}

impl SettingsItem {
    pub const ALL: [SettingsItem; 2] = [SettingsItem::Theme, SettingsItem::Animation];
}

/// Models shown on the Models page under the current tag filter.
pub fn visible_models<'a>(app: &App, data: &'a UiData) -> Vec<&'a ModelEntry> {
    let Some(listing) = data.models.ready() else {
        return Vec::new();
    };
    listing
        .models
        .iter()
        .filter(|m| match &app.model_tag {
            Some(tag) => m.tags.iter().any(|t| t == tag),
            None => true,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct App {
    pub pages: PageStack,
    pub overlay: Overlay,
    pub flags: UiFlags,
    pub toast: Option<Toast>,
    pub should_quit: bool,
    pub tick: u64,

    pub menu_idx: usize,
    pub provider_idx: usize,
    pub form_idx: usize,
    pub default_idx: usize,
    pub model_idx: usize,
    pub settings_idx: usize,

    pub reveal_secrets: bool,
    pub build_target: Target,
    pub build_override: Option<String>,
    pub model_tag: Option<String>,

    pub active_probe: Option<ActiveProbe>,
    probe_seq: u64,
}

impl App {
    pub fn new(flags: UiFlags) -> Self {
        Self {
            pages: PageStack::new(),
            overlay: Overlay::None,
            flags,
            toast: None,
            should_quit: false,
            tick: 0,
            menu_idx: 0,
            provider_idx: 0,
            form_idx: 0,
            default_idx: 0,
            model_idx: 0,
            settings_idx: 0,
            reveal_secrets: false,
            build_target: Target::Project,
            build_override: None,
            model_tag: None,
            active_probe: None,
            probe_seq: 0,
        }
    }

    pub fn route(&self) -> &Route {
        self.pages.top()
    }

    pub fn on_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        if let Some(toast) = &mut self.toast {
            if toast.remaining_ticks > 0 {
                toast.remaining_ticks -= 1;
            }
            if toast.remaining_ticks == 0 {
                self.toast = None;
            }
        }
    }

    pub fn push_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.toast = Some(Toast::new(message, kind));
    }

    fn after_navigation(&mut self) {
        self.reveal_secrets = false;
        if !self.route().keeps_probe() && self.active_probe.take().is_some() {
            log::debug!("left providers pages; dropping in-flight probe");
        }
    }

    pub fn navigate_to(&mut self, route: Route) -> Action {
        if !self.pages.push(route) {
            return Action::None;
        }
        self.after_navigation();
        Action::Navigated
    }

    pub fn open_form(&mut self, id: &str) -> Action {
        self.form_idx = 0;
        self.navigate_to(Route::ProviderForm { id: id.to_string() })
    }

    fn go_back(&mut self) -> Action {
        if self.pages.pop().is_none() {
            self.should_quit = true;
            return Action::Quit;
        }
        self.after_navigation();
        Action::Navigated
    }

    /// Issues a token for a new connectivity test, superseding any earlier one.
    pub fn begin_probe(&mut self, provider_id: &str) -> u64 {
        self.probe_seq += 1;
        self.active_probe = Some(ActiveProbe {
            token: self.probe_seq,
            provider_id: provider_id.to_string(),
        });
        self.probe_seq
    }

    /// Clears and reports whether `token` is the probe still awaited.
    pub fn finish_probe(&mut self, token: u64) -> bool {
        match &self.active_probe {
            Some(active) if active.token == token => {
                self.active_probe = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_busy(&self, data: &UiData) -> bool {
        self.active_probe.is_some() || data.schemas.is_loading() || data.models.is_loading()
    }

    fn form_provider<'a>(&self, data: &'a UiData) -> Option<&'a Provider> {
        match self.route() {
            Route::ProviderForm { id } => data.catalog.get(id),
            _ => None,
        }
    }

    fn form_row_count(&self, data: &UiData) -> usize {
        self.form_provider(data)
            .map(|p| data.provider_schema(p).fields.len() + 2)
            .unwrap_or(0)
    }

    fn clamp_selections(&mut self, data: &UiData) {
        let clamp = |idx: usize, len: usize| idx.min(len.saturating_sub(1));
        let providers = data.catalog.len();
        self.provider_idx = clamp(self.provider_idx, providers);
        self.default_idx = clamp(self.default_idx, providers);
        self.form_idx = clamp(self.form_idx, self.form_row_count(data));
        self.model_idx = clamp(self.model_idx, visible_models(self, data).len());
        self.menu_idx = clamp(self.menu_idx, Section::ALL.len() + 1);
        self.settings_idx = clamp(self.settings_idx, SettingsItem::ALL.len());
        if let Some(id) = &self.build_override {
            if data.catalog.get(id).is_none() {
                self.build_override = None;
            }
        }
    }

    pub fn on_key(&mut self, key: KeyEvent, data: &UiData) -> Action {
        self.clamp_selections(data);

        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            self.should_quit = true;
            return Action::Quit;
        }

        if self.overlay.captures_text() {
            return self.on_text_edit_key(key, data);
        }

        if let Some(action) = self.on_global_key(key) {
            return action;
        }

        if self.overlay.is_active() {
            return self.on_overlay_key(key);
        }

        if key.code == KeyCode::Esc {
            return self.go_back();
        }

        match self.route().clone() {
            Route::Welcome => self.on_welcome_key(key),
            Route::Providers => self.on_providers_key(key, data),
            Route::ProviderForm { id } => self.on_form_key(key, data, &id),
            Route::SelectDefault => self.on_select_default_key(key, data),
            Route::Models => self.on_models_key(key, data),
            Route::Build => self.on_build_key(key, data),
            Route::Diagnostics => self.on_diagnostics_key(key),
            Route::Settings => self.on_settings_key(key),
        }
    }

    fn on_global_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return None;
        }
        let KeyCode::Char(c) = key.code else {
            return None;
        };
        if let Some(section) = Section::from_key(c) {
            self.overlay = Overlay::None;
            return Some(self.navigate_to(section.to_route()));
        }
        match c {
            '?' => {
                self.overlay = match self.overlay {
                    Overlay::Help => Overlay::None,
                    _ => Overlay::Help,
                };
                Some(Action::None)
            }
            'T' => {
                self.flags.theme = self.flags.theme.toggle();
                Some(Action::PersistSettings)
            }
            'A' => {
                self.flags.animation = !self.flags.animation;
                Some(Action::PersistSettings)
            }
            'q' => {
                self.should_quit = true;
                Some(Action::Quit)
            }
            _ => None,
        }
    }

    fn on_text_edit_key(&mut self, key: KeyEvent, data: &UiData) -> Action {
        let row_count = self.form_row_count(data);
        let edit = match &mut self.overlay {
            Overlay::FieldEdit(edit) | Overlay::TagEdit(edit) => edit,
            _ => return Action::None,
        };
        match key.code {
            KeyCode::Esc => {
                self.overlay = Overlay::None;
                Action::None
            }
            KeyCode::Enter => {
                let commit = edit.commit();
                self.overlay = Overlay::None;
                Action::Commit(commit)
            }
            KeyCode::Tab => {
                let commit = edit.commit();
                let next = edit.row + 1;
                self.overlay = Overlay::None;
                self.form_idx = next.min(row_count.saturating_sub(1));
                Action::Commit(commit)
            }
            KeyCode::Left => {
                edit.draft.move_left();
                Action::None
            }
            KeyCode::Right => {
                edit.draft.move_right();
                Action::None
            }
            KeyCode::Home => {
                edit.draft.move_home();
                Action::None
            }
            KeyCode::End => {
                edit.draft.move_end();
                Action::None
            }
            KeyCode::Backspace => {
                edit.draft.backspace();
                Action::None
            }
            KeyCode::Delete => {
                edit.draft.delete();
                Action::None
            }
            KeyCode::Char(c) => {
                edit.draft.insert_char(c);
                Action::None
            }
            _ => Action::None,
        }
    }

    fn on_overlay_key(&mut self, key: KeyEvent) -> Action {
        match &mut self.overlay {
            Overlay::None | Overlay::FieldEdit(_) | Overlay::TagEdit(_) => Action::None,
            Overlay::Help => {
                if key.code == KeyCode::Esc {
                    self.overlay = Overlay::None;
                }
                Action::None
            }
            Overlay::Dropdown(dropdown) => match key.code {
                KeyCode::Up => {
                    dropdown.move_up();
                    Action::None
                }
                KeyCode::Down => {
                    dropdown.move_down();
                    Action::None
                }
                KeyCode::Enter => {
                    let commit = dropdown.commit();
                    self.overlay = Overlay::None;
                    commit.map(Action::Commit).unwrap_or(Action::None)
                }
                KeyCode::Esc => {
                    self.overlay = Overlay::None;
                    Action::None
                }
                _ => Action::None,
            },
            Overlay::AddMode(state) => match key.code {
                KeyCode::Up => {
                    state.cursor = state.cursor.saturating_sub(1);
                    Action::None
                }
                KeyCode::Down => {
                    if !state.types.is_empty() {
                        state.cursor = (state.cursor + 1).min(state.types.len() - 1);
                    }
                    Action::None
                }
                KeyCode::Enter => {
                    let chosen = state.types.get(state.cursor).cloned();
                    self.overlay = Overlay::None;
                    match chosen {
                        Some(provider_type) => Action::AddProvider { provider_type },
                        None => Action::None,
                    }
                }
                KeyCode::Esc => {
                    self.overlay = Overlay::None;
                    Action::None
                }
                _ => Action::None,
            },
            Overlay::Confirm(confirm) => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    let action = match &confirm.action {
                        ConfirmAction::DeleteProvider { id } => {
                            Action::DeleteProvider { id: id.clone() }
                        }
                    };
                    self.overlay = Overlay::None;
                    action
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.overlay = Overlay::None;
                    Action::None
                }
                _ => Action::None,
            },
        }
    }

    fn on_welcome_key(&mut self, key: KeyEvent) -> Action {
        let items = Section::ALL.len() + 1;
        match key.code {
            KeyCode::Up => {
                self.menu_idx = self.menu_idx.saturating_sub(1);
                Action::None
            }
            KeyCode::Down => {
                self.menu_idx = (self.menu_idx + 1).min(items - 1);
                Action::None
            }
            KeyCode::Enter => match Section::ALL.get(self.menu_idx) {
                Some(section) => self.navigate_to(section.to_route()),
                None => {
                    self.should_quit = true;
                    Action::Quit
                }
            },
            _ => Action::None,
        }
    }

    fn on_providers_key(&mut self, key: KeyEvent, data: &UiData) -> Action {
        let selected = data.provider_at(self.provider_idx);
        match key.code {
            KeyCode::Up => {
                self.provider_idx = self.provider_idx.saturating_sub(1);
                Action::None
            }
            KeyCode::Down => {
                if !data.catalog.is_empty() {
                    self.provider_idx = (self.provider_idx + 1).min(data.catalog.len() - 1);
                }
                Action::None
            }
            KeyCode::Enter => match selected {
                Some(p) => {
                    let id = p.id.clone();
                    self.open_form(&id)
                }
                None => Action::None,
            },
            KeyCode::Char('a') => {
                match &data.schemas {
                    Loadable::Ready(set) => {
                        self.overlay = Overlay::AddMode(AddModeState {
                            types: set.type_names(),
                            cursor: 0,
                        });
                    }
                    Loadable::Failed(err) => self.push_toast(
                        format!("Adding providers is disabled: {err}"),
                        ToastKind::Warning,
                    ),
                    Loadable::Loading | Loadable::NotRequested => {
                        self.push_toast("Provider types are still loading", ToastKind::Info)
                    }
                }
                Action::None
            }
            KeyCode::Char('d') => {
                let Some(p) = selected else {
                    return Action::None;
                };
                self.overlay = Overlay::Confirm(ConfirmOverlay {
                    title: "Delete provider".to_string(),
                    message: format!("Delete '{}' ({})? This cannot be undone.", p.name, p.id),
                    action: ConfirmAction::DeleteProvider { id: p.id.clone() },
                });
                Action::None
            }
            KeyCode::Char('t') => match selected {
                Some(p) => Action::Probe { id: p.id.clone() },
                None => Action::None,
            },
            KeyCode::Char('s') => Action::SaveCatalog,
            _ => Action::None,
        }
    }

    fn on_form_key(&mut self, key: KeyEvent, data: &UiData, id: &str) -> Action {
        let Some(provider) = data.catalog.get(id) else {
            return Action::None;
        };
        let row_count = self.form_row_count(data);
        match key.code {
            KeyCode::Up | KeyCode::BackTab => {
                self.form_idx = self.form_idx.saturating_sub(1);
                Action::None
            }
            KeyCode::Down | KeyCode::Tab => {
                self.form_idx = (self.form_idx + 1).min(row_count.saturating_sub(1));
                Action::None
            }
            KeyCode::Enter => {
                let schema = data.provider_schema(provider);
                let rows = form_rows(provider, &schema, false);
                let Some(row) = rows.get(self.form_idx) else {
                    return Action::None;
                };
                let row_idx = self.form_idx;
                self.overlay = match &row.target {
                    RowTarget::Field(field) if field.is_choice() && !field.choices().is_empty() => {
                        Overlay::Dropdown(Dropdown::begin(provider, row_idx, field.clone()))
                    }
                    RowTarget::Tags => {
                        Overlay::TagEdit(FieldEdit::begin(provider, row_idx, RowTarget::Tags))
                    }
                    target => {
                        Overlay::FieldEdit(FieldEdit::begin(provider, row_idx, target.clone()))
                    }
                };
                Action::None
            }
            KeyCode::Char('v') => {
                self.reveal_secrets = !self.reveal_secrets;
                Action::None
            }
            KeyCode::Char('t') => Action::Probe { id: id.to_string() },
            KeyCode::Char('s') => Action::SaveCatalog,
            _ => Action::None,
        }
    }

    fn on_select_default_key(&mut self, key: KeyEvent, data: &UiData) -> Action {
        match key.code {
            KeyCode::Up => {
                self.default_idx = self.default_idx.saturating_sub(1);
                Action::None
            }
            KeyCode::Down => {
                if !data.catalog.is_empty() {
                    self.default_idx = (self.default_idx + 1).min(data.catalog.len() - 1);
                }
                Action::None
            }
            KeyCode::Enter => match data.provider_at(self.default_idx) {
                Some(p) => Action::SetDefault { id: p.id.clone() },
                None => Action::None,
            },
            KeyCode::Char('s') => Action::SaveCatalog,
            _ => Action::None,
        }
    }

    fn on_models_key(&mut self, key: KeyEvent, data: &UiData) -> Action {
        let visible = visible_models(self, data);
        match key.code {
            KeyCode::Up => {
                self.model_idx = self.model_idx.saturating_sub(1);
                Action::None
            }
            KeyCode::Down => {
                if !visible.is_empty() {
                    self.model_idx = (self.model_idx + 1).min(visible.len() - 1);
                }
                Action::None
            }
            KeyCode::Enter => match visible.get(self.model_idx) {
                Some(model) => Action::ApplyModel {
                    model_id: model.id.clone(),
                },
                None => Action::None,
            },
            KeyCode::Char('f') => {
                let tags = data.models.ready().map(|l| l.all_tags()).unwrap_or_default();
                self.model_tag = match &self.model_tag {
                    None => tags.first().cloned(),
                    Some(current) => tags
                        .iter()
                        .position(|t| t == current)
                        .and_then(|i| tags.get(i + 1))
                        .cloned(),
                };
                self.model_idx = 0;
                Action::None
            }
            KeyCode::Char('r') => Action::RefreshModels,
            _ => Action::None,
        }
    }

    fn on_build_key(&mut self, key: KeyEvent, data: &UiData) -> Action {
        match key.code {
            KeyCode::Char('g') => {
                self.build_target = self.build_target.toggle();
                Action::None
            }
            KeyCode::Char('o') => {
                let providers = data.catalog.providers();
                self.build_override = match &self.build_override {
                    None => providers.first().map(|p| p.id.clone()),
                    Some(current) => providers
                        .iter()
                        .position(|p| &p.id == current)
                        .and_then(|i| providers.get(i + 1))
                        .map(|p| p.id.clone()),
                };
                Action::None
            }
            KeyCode::Enter => Action::WriteActivation {
                target: self.build_target,
                override_id: self.build_override.clone(),
            },
            _ => Action::None,
        }
    }

    fn on_diagnostics_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('r') => Action::RefreshDiagnostics,
            KeyCode::Char('e') => Action::ExportDiagnostics,
            _ => Action::None,
        }
    }

    fn on_settings_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Up => {
                self.settings_idx = self.settings_idx.saturating_sub(1);
                Action::None
            }
            KeyCode::Down => {
                self.settings_idx = (self.settings_idx + 1).min(SettingsItem::ALL.len() - 1);
                Action::None
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                match SettingsItem::ALL.get(self.settings_idx) {
                    Some(SettingsItem::Theme) => self.flags.theme = self.flags.theme.toggle(),
                    Some(SettingsItem::Animation) => self.flags.animation = !self.flags.animation,
                    None => return Action::None,
                }
                Action::PersistSettings
            }
            _ => Action::None,
        }
    }
}

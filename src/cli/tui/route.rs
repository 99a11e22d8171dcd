#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Welcome,
    Providers,
    ProviderForm { id: String },
    SelectDefault,
    Models,
    Build,
    Diagnostics,
    Settings,
}

impl Route {
    pub fn title(&self) -> &'static str {
        match self {
            Route::Welcome => "Welcome",
            Route::Providers => "Providers",
            Route::ProviderForm { .. } => "Provider",
            Route::SelectDefault => "Select Default",
            Route::Models => "Models",
            Route::Build => "Build",
            Route::Diagnostics => "Diagnostics",
            Route::Settings => "Settings",
        }
    }

    /// Pages where a running connectivity test is still relevant.
    pub fn keeps_probe(&self) -> bool {
        matches!(self, Route::Providers | Route::ProviderForm { .. })
    }

    /// Pages that need provider-type schemas.
    pub fn needs_schema(&self) -> bool {
        matches!(
            self,
            Route::Providers | Route::ProviderForm { .. } | Route::SelectDefault | Route::Models
        )
    }
}

/// Top-level sections reachable from the welcome menu and the digit keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Providers,
    SelectDefault,
    Models,
    Build,
    Diagnostics,
    Settings,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Providers,
        Section::SelectDefault,
        Section::Models,
        Section::Build,
        Section::Diagnostics,
        Section::Settings,
    ];

    pub fn key(self) -> char {
        match self {
            Section::Providers => '1',
            Section::SelectDefault => '2',
            Section::Models => '3',
            Section::Build => '4',
            Section::Diagnostics => '5',
            Section::Settings => '6',
        }
    }

    pub fn from_key(c: char) -> Option<Section> {
        Section::ALL.into_iter().find(|s| s.key() == c)
    }

    pub fn label(self) -> &'static str {
        match self {
            Section::Providers => "Configure Providers",
            Section::SelectDefault => "Select Default",
            Section::Models => "Model Browser",
            Section::Build => "Build Configuration",
            Section::Diagnostics => "Diagnostics",
            Section::Settings => "Settings",
        }
    }

    pub fn to_route(self) -> Route {
        match self {
            Section::Providers => Route::Providers,
            Section::SelectDefault => Route::SelectDefault,
            Section::Models => Route::Models,
            Section::Build => Route::Build,
            Section::Diagnostics => Route::Diagnostics,
            Section::Settings => Route::Settings,
        }
    }
}

/// Navigation history. The welcome page sits at the bottom and can never be
/// popped, so the stack is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageStack {
    root: Route,
    pushed: Vec<Route>,
}

impl Default for PageStack {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStack {
    pub fn new() -> Self {
        Self {
            root: Route::Welcome,
            pushed: Vec::new(),
        }
    }

    pub fn top(&self) -> &Route {
        self.pushed.last().unwrap_or(&self.root)
    }

    pub fn at_root(&self) -> bool {
        self.pushed.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.pushed.len() + 1
    }

    /// Pushes `route` unless it is already on top. Returns whether it moved.
    pub fn push(&mut self, route: Route) -> bool {
        if *self.top() == route {
            return false;
        }
        self.pushed.push(route);
        true
    }

    pub fn pop(&mut self) -> Option<Route> {
        self.pushed.pop()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        std::iter::once(&self.root).chain(self.pushed.iter())
    }

    /// Drops pushed pages matching `pred`, e.g. forms of a deleted provider.
    pub fn remove_where(&mut self, pred: impl Fn(&Route) -> bool) {
        self.pushed.retain(|r| !pred(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cannot_be_popped() {
        let mut stack = PageStack::new();
        assert!(stack.at_root());
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.top(), &Route::Welcome);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn push_ignores_same_page_on_top() {
        let mut stack = PageStack::new();
        assert!(stack.push(Route::Providers));
        assert!(!stack.push(Route::Providers));
        assert_eq!(stack.depth(), 2);
        assert!(stack.push(Route::Models));
        assert!(stack.push(Route::Providers));
        assert_eq!(stack.depth(), 4);
    }

    #[test]
    fn remove_where_drops_matching_pages() {
        let mut stack = PageStack::new();
        stack.push(Route::Providers);
        stack.push(Route::ProviderForm { id: "p1".into() });
        stack.remove_where(|r| matches!(r, Route::ProviderForm { id } if id == "p1"));
        assert_eq!(stack.top(), &Route::Providers);
    }

    #[test]
    fn section_keys_round_trip() {
        for section in Section::ALL {
            assert_eq!(Section::from_key(section.key()), Some(section));
        }
        assert_eq!(Section::from_key('7'), None);
    }
}

// ============================================================================
// Input kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    /// `exit` / `quit`: save everything and stop.
    Shutdown,
    /// `sleep`: immediate rest cycle.
    Rest,
    /// Nothing to respond to.
    Ignore,
    /// Anything else, trimmed.
    Converse(String),
}

// ============================================================================
// InputRule trait
// ============================================================================

pub trait InputRule: Send + Sync {
    /// Classify input, or None to pass to the next rule.
    fn evaluate(&self, input: &str) -> Option<InputKind>;

    /// Name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// InputRouter
// ============================================================================

pub struct InputRouter {
    rules: Vec<Box<dyn InputRule>>,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl InputRouter {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a router with the built-in command rules.
    pub fn with_defaults() -> Self {
        let mut router = Self::new();
        router.add_rule(Box::new(EmptyInputRule));
        router.add_rule(Box::new(ShutdownRule));
        router.add_rule(Box::new(RestRule));
        router
    }

    pub fn add_rule(&mut self, rule: Box<dyn InputRule>) {
        self.rules.push(rule);
    }

    /// First match wins; unmatched input is conversational.
    pub fn route(&self, input: &str) -> InputKind {
        for rule in &self.rules {
            if let Some(kind) = rule.evaluate(input) {
                tracing::debug!("InputRouter: rule '{}' matched → {:?}", rule.name(), kind);
                return kind;
            }
        }
        InputKind::Converse(input.trim().to_string())
    }
}

// ============================================================================
// Built-in rules
// ============================================================================

/// Filters empty or whitespace-only input.
pub struct EmptyInputRule;

impl InputRule for EmptyInputRule {
    fn evaluate(&self, input: &str) -> Option<InputKind> {
        input.trim().is_empty().then_some(InputKind::Ignore)
    }

    fn name(&self) -> &str {
        "empty_input"
    }
}

pub struct ShutdownRule;

impl InputRule for ShutdownRule {
    fn evaluate(&self, input: &str) -> Option<InputKind> {
        let cmd = input.trim();
        (cmd.eq_ignore_ascii_case("exit") || cmd.eq_ignore_ascii_case("quit"))
            .then_some(InputKind::Shutdown)
    }

    fn name(&self) -> &str {
        "shutdown"
    }
}

pub struct RestRule;

impl InputRule for RestRule {
    fn evaluate(&self, input: &str) -> Option<InputKind> {
        input.trim().eq_ignore_ascii_case("sleep").then_some(InputKind::Rest)
    }

    fn name(&self) -> &str {
        "rest"
    }
}

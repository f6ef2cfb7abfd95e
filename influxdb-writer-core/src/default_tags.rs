use std::collections::BTreeMap;
use std::sync::Arc;

/// Default tags after expression resolution, sorted by key.
pub type ResolvedTags = BTreeMap<String, String>;

/// Looks up the name inside a `${...}` default tag reference.
pub type TagResolver = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Tags added to every point that does not set them itself.
///
/// A value is either a literal or a `${...}` reference. References are looked
/// up through the resolver given to [`DefaultTags::resolve`]: `${env.HOST}`
/// asks for `env.HOST`, `${app.region}` asks for `app.region`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultTags {
    tags: BTreeMap<String, String>,
}

impl DefaultTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_default_tag(mut self, key: &str, expression: &str) -> Self {
        self.tags.insert(key.to_string(), expression.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn resolve<F>(&self, resolver: F) -> ResolvedTags
    where
        F: Fn(&str) -> Option<String>,
    {
        self.tags
            .iter()
            .filter_map(|(key, expression)| {
                let value = match reference(expression) {
                    Some(name) => resolver(name)?,
                    None => expression.clone(),
                };
                (!key.is_empty() && !value.trim().is_empty()).then(|| (key.clone(), value))
            })
            .collect()
    }
}

fn reference(expression: &str) -> Option<&str> {
    expression
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

/// Resolves `env.NAME` references from the process environment.
pub fn env_resolver(name: &str) -> Option<String> {
    name.strip_prefix("env.").and_then(|var| std::env::var(var).ok())
}

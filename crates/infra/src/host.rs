//! Host stand-ins for a headless process: provider context from env, prompts on stderr.

use codebase_index_adapters::log_sink::{LogSink, StderrLogSink};
use codebase_index_config::{IndexerEnv, ValidatedIndexerConfig};
use codebase_index_domain::ProviderState;
use codebase_index_ports::{BoxFuture, HostNotifierPort, PromptAction, ProviderContextPort};
use codebase_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString};
use std::sync::Arc;

/// Provider context fixed at startup from `CBI_PROVIDER`, `CBI_FEATURE_ENABLED`
/// and `CBI_AUTH_TOKEN`.
///
/// An unset provider defaults to the configured expected kind and an unset
/// feature flag defaults to on.
#[derive(Debug, Clone)]
pub struct StaticProviderContext {
    state: ProviderState,
    token: Option<SecretString>,
}

impl StaticProviderContext {
    /// Context with an explicit state and token.
    #[must_use]
    pub const fn new(state: ProviderState, token: Option<SecretString>) -> Self {
        Self { state, token }
    }

    /// Context derived from the parsed environment.
    #[must_use]
    pub fn from_env(env: &IndexerEnv, config: &ValidatedIndexerConfig) -> Self {
        let provider_kind = env
            .provider
            .clone()
            .unwrap_or_else(|| config.provider.expected_kind.clone());
        Self::new(
            ProviderState {
                provider_kind,
                feature_enabled: env.feature_enabled.unwrap_or(true),
            },
            env.auth_token.clone(),
        )
    }
}

impl ProviderContextPort for StaticProviderContext {
    fn provider_state(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<ProviderState>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("provider.state")?;
            Ok(self.state.clone())
        })
    }

    fn bearer_token(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<SecretString>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("provider.token")?;
            self.token.clone().ok_or_else(|| {
                ErrorEnvelope::expected(
                    ErrorCode::new("provider", "token_unavailable"),
                    "no auth token configured (set CBI_AUTH_TOKEN)",
                )
            })
        })
    }
}

/// Writes prompts as JSON lines (`{"type":"prompt",...}`) to a sink.
#[derive(Clone)]
pub struct StderrNotifier {
    sink: Arc<dyn LogSink>,
}

impl StderrNotifier {
    /// Notifier writing to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(Arc::new(StderrLogSink))
    }

    /// Notifier writing to `sink`.
    #[must_use]
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl Default for StderrNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HostNotifierPort for StderrNotifier {
    fn prompt(&self, message: &str, action: PromptAction) {
        let action = match action {
            PromptAction::Retry => "retry",
            PromptAction::Reinstall => "reinstall",
        };
        tracing::warn!(action, "{message}");
        let payload = serde_json::json!({
            "type": "prompt",
            "message": message,
            "action": action,
        });
        let mut line = payload.to_string();
        line.push('\n');
        self.sink.write_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_adapters::log_sink::MemoryLogSink;
    use codebase_index_config::load_config_from_sources;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> Result<IndexerEnv> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        IndexerEnv::from_map(&map).map_err(ErrorEnvelope::from)
    }

    #[tokio::test]
    async fn defaults_to_expected_provider() -> Result<()> {
        let env = env(&[])?;
        let config = load_config_from_sources(None, None, &env)?;
        let context = StaticProviderContext::from_env(&env, &config);
        let ctx = RequestContext::new_request();

        let state = context.provider_state(&ctx).await?;
        assert!(state.supports(&config.provider.expected_kind));

        let error = match context.bearer_token(&ctx).await {
            Ok(_) => panic!("token should be missing"),
            Err(error) => error,
        };
        assert!(error.has_code("provider", "token_unavailable"));
        Ok(())
    }

    #[tokio::test]
    async fn env_selects_provider_and_token() -> Result<()> {
        let env = env(&[
            ("CBI_PROVIDER", "openai"),
            ("CBI_FEATURE_ENABLED", "off"),
            ("CBI_AUTH_TOKEN", "tok-1"),
        ])?;
        let config = load_config_from_sources(None, None, &env)?;
        let context = StaticProviderContext::from_env(&env, &config);
        let ctx = RequestContext::new_request();

        let state = context.provider_state(&ctx).await?;
        assert_eq!(state.provider_kind, "openai");
        assert!(!state.feature_enabled);
        assert_eq!(context.bearer_token(&ctx).await?.expose(), "tok-1");
        Ok(())
    }

    #[test]
    fn prompts_are_json_lines() {
        let memory = Arc::new(MemoryLogSink::default());
        let notifier = StderrNotifier::with_sink(memory.clone());
        notifier.prompt("indexer failed to start", PromptAction::Retry);

        let lines = memory.take();
        let Some(line) = lines.first() else {
            panic!("prompt line expected");
        };
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(error) => panic!("invalid prompt line: {error}"),
        };
        assert_eq!(value["type"], "prompt");
        assert_eq!(value["action"], "retry");
        assert_eq!(value["message"], "indexer failed to start");
    }
}

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_u32, parse_u64, trim_base_url,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, GeminiSettings, GroqSettings, RuntimeSettings,
    ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("TUTOR_HOST", "0.0.0.0");
        let port = env_or_default("TUTOR_PORT", "8000");

        let environment =
            parse_environment(env_optional("TUTOR_ENV").or_else(|| env_optional("ENVIRONMENT")));

        let project_name = env_or_default("PROJECT_NAME", "Math Tutor API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let gemini_api_key = env_or_default("GEMINI_API_KEY", "");
        let gemini_base_url = trim_base_url(env_or_default(
            "GEMINI_BASE_URL",
            "https://generativelanguage.googleapis.com/v1beta",
        ));
        let gemini_model = env_or_default("GEMINI_MODEL", "gemini-1.5-flash");
        let gemini_timeout_seconds =
            parse_u64("GEMINI_TIMEOUT_SECONDS", env_or_default("GEMINI_TIMEOUT_SECONDS", "120"))?;
        let gemini_max_retries =
            parse_u32("GEMINI_MAX_RETRIES", env_or_default("GEMINI_MAX_RETRIES", "3"))?;
        let gemini_retry_base_delay_ms = parse_u64(
            "GEMINI_RETRY_BASE_DELAY_MS",
            env_or_default("GEMINI_RETRY_BASE_DELAY_MS", "1000"),
        )?;
        let max_image_size_mb =
            parse_u64("MAX_IMAGE_SIZE_MB", env_or_default("MAX_IMAGE_SIZE_MB", "10"))?;

        let groq_api_key = env_or_default("GROQ_API_KEY", "");
        let groq_base_url =
            trim_base_url(env_or_default("GROQ_BASE_URL", "https://api.groq.com/openai/v1"));
        let groq_model = env_or_default("GROQ_MODEL", "deepseek-r1-distill-llama-70b");
        let groq_temperature =
            parse_f64("GROQ_TEMPERATURE", env_or_default("GROQ_TEMPERATURE", "0.7"))?;
        let groq_max_tokens =
            parse_u32("GROQ_MAX_TOKENS", env_or_default("GROQ_MAX_TOKENS", "1000"))?;
        let groq_timeout_seconds =
            parse_u64("GROQ_TIMEOUT_SECONDS", env_or_default("GROQ_TIMEOUT_SECONDS", "120"))?;

        let log_level = env_or_default("TUTOR_LOG_LEVEL", "info");
        let json = env_optional("TUTOR_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment },
            api: ApiSettings { project_name, version },
            cors: CorsSettings { origins: cors_origins },
            gemini: GeminiSettings {
                api_key: gemini_api_key,
                base_url: gemini_base_url,
                model: gemini_model,
                timeout_seconds: gemini_timeout_seconds,
                max_retries: gemini_max_retries,
                retry_base_delay_ms: gemini_retry_base_delay_ms,
                max_image_size_mb,
            },
            groq: GroqSettings {
                api_key: groq_api_key,
                base_url: groq_base_url,
                model: groq_model,
                temperature: groq_temperature,
                max_tokens: groq_max_tokens,
                timeout_seconds: groq_timeout_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn gemini(&self) -> &GeminiSettings {
        &self.gemini
    }

    pub(crate) fn groq(&self) -> &GroqSettings {
        &self.groq
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Provider credentials are a deployment concern: fail at startup, never per request.
        if self.gemini.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("GEMINI_API_KEY"));
        }
        if self.groq.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("GROQ_API_KEY"));
        }

        if self.gemini.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "GEMINI_BASE_URL",
                value: String::from("<empty>"),
            });
        }
        if self.groq.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "GROQ_BASE_URL",
                value: String::from("<empty>"),
            });
        }

        if self.gemini.max_image_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_IMAGE_SIZE_MB",
                value: "0".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.groq.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "GROQ_TEMPERATURE",
                value: self.groq.temperature.to_string(),
            });
        }

        if self.groq.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GROQ_MAX_TOKENS",
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u64,
    parse_usize,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, LlmSettings, OcrSettings, PathSettings,
    RuntimeSettings, S3Settings, ServerHost, ServerPort, ServerSettings, Settings,
    StorageSettings, TelemetrySettings,
};
use crate::services::paths::{PathSchema, DEFAULT_PATH_SCHEMA};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("OCR_HOST", "0.0.0.0");
        let port = env_or_default("OCR_PORT", "8000");

        let environment =
            parse_environment(env_optional("OCR_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("OCR_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Handwriting Recognition API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let llm_api_key = env_or_default("LLM_API_KEY", "");
        let llm_base_url = env_or_default("LLM_BASE_URL", "https://api.groq.com/openai/v1");
        let llm_model = env_or_default("LLM_MODEL", "llama3-70b-8192");
        let llm_request_timeout =
            parse_u64("LLM_REQUEST_TIMEOUT", env_or_default("LLM_REQUEST_TIMEOUT", "120"))?;
        let correction_language = env_or_default("CORRECTION_LANGUAGE", "C#");
        let analysis_language = env_or_default("ANALYSIS_LANGUAGE", "Russian");

        let ocr_service_url = env_or_default("OCR_SERVICE_URL", "http://localhost:8866/ocr");
        let ocr_request_timeout =
            parse_u64("OCR_REQUEST_TIMEOUT", env_or_default("OCR_REQUEST_TIMEOUT", "60"))?;
        let batch_concurrency =
            parse_usize("OCR_BATCH_CONCURRENCY", env_or_default("OCR_BATCH_CONCURRENCY", "1"))?;
        let image_timeout_seconds = parse_u64(
            "OCR_IMAGE_TIMEOUT_SECONDS",
            env_or_default("OCR_IMAGE_TIMEOUT_SECONDS", "0"),
        )?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let max_images_per_submission = parse_u64(
            "MAX_IMAGES_PER_SUBMISSION",
            env_or_default("MAX_IMAGES_PER_SUBMISSION", "20"),
        )?;

        let s3_endpoint = env_or_default("S3_ENDPOINT", "https://s3.storage.selcloud.ru");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "handwriting-samples");
        let s3_region = env_or_default("S3_REGION", "ru-1");
        let s3_public_base_url = env_optional("S3_PUBLIC_BASE_URL");

        let path_schema = PathSchema::parse(&env_or_default("PATH_SCHEMA", DEFAULT_PATH_SCHEMA))
            .map_err(|err| ConfigError::InvalidPathSchema(err.to_string()))?;

        let log_level = env_or_default("OCR_LOG_LEVEL", "info");
        let json = env_optional("OCR_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            llm: LlmSettings {
                api_key: llm_api_key,
                base_url: llm_base_url,
                model: llm_model,
                request_timeout: llm_request_timeout,
                correction_language,
                analysis_language,
            },
            ocr: OcrSettings {
                service_url: ocr_service_url,
                request_timeout: ocr_request_timeout,
                batch_concurrency,
                image_timeout_seconds,
            },
            storage: StorageSettings { max_upload_size_mb, max_images_per_submission },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
                public_base_url: s3_public_base_url,
            },
            paths: PathSettings { schema: path_schema },
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

    pub(crate) fn llm(&self) -> &LlmSettings {
        &self.llm
    }

    pub(crate) fn ocr(&self) -> &OcrSettings {
        &self.ocr
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn paths(&self) -> &PathSettings {
        &self.paths
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ocr.batch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "OCR_BATCH_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.storage.max_images_per_submission == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_IMAGES_PER_SUBMISSION",
                value: "0".to_string(),
            });
        }

        if reqwest::Url::parse(&self.s3.endpoint).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "S3_ENDPOINT",
                value: self.s3.endpoint.clone(),
            });
        }

        if let Some(base) = &self.s3.public_base_url {
            if reqwest::Url::parse(base).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: "S3_PUBLIC_BASE_URL",
                    value: base.clone(),
                });
            }
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.llm.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("LLM_API_KEY"));
        }
        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        Ok(())
    }
}

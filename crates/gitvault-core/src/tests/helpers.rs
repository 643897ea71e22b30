use std::collections::BTreeMap;

use crate::config::{
    Credential, JobMode, JobSchedule, LoggingSettings, PayloadSignatureMode, RepositoryJob,
    RetrySettings, ScheduleSettings, Settings, StorageSettings,
};
use crate::forge::ForgeKind;

pub fn test_settings() -> Settings {
    Settings {
        logging: LoggingSettings::default(),
        working_root: "/tmp/gitvault-test".to_string(),
        storage: StorageSettings {
            endpoint: "https://s3.example.com".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            bucket: "backups".to_string(),
            force_path_style: false,
            payload_signature_mode: PayloadSignatureMode::Full,
            always_calculate_content_md5: false,
            retention: None,
            retention_minimum: 1,
            retry: RetrySettings::default(),
        },
        credentials: BTreeMap::new(),
        repositories: Vec::new(),
        schedule: ScheduleSettings {
            repositories: JobSchedule {
                cron: "0 * * * *".to_string(),
            },
            backups: None,
            mirrors: None,
        },
    }
}

pub fn with_credential(mut settings: Settings, name: &str) -> Settings {
    settings.credentials.insert(
        name.to_lowercase(),
        Credential {
            username: Some("user".to_string()),
            api_key: "token".to_string(),
        },
    );
    settings
}

pub fn url_job(url: &str) -> RepositoryJob {
    RepositoryJob {
        mode: JobMode::Url,
        provider: None,
        credential: None,
        url: Some(url.to_string()),
        base_url: None,
        lfs: false,
        enabled: true,
    }
}

pub fn provider_job(kind: ForgeKind, credential: &str) -> RepositoryJob {
    RepositoryJob {
        mode: JobMode::Provider,
        provider: Some(kind),
        credential: Some(credential.to_string()),
        url: None,
        base_url: None,
        lfs: false,
        enabled: true,
    }
}

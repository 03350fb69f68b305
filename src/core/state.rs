use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::transcription::TranscriptionService;
use crate::services::tutor::TutorService;

/// Shared per-process state, immutable after startup.
#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    transcription: TranscriptionService,
    tutor: TutorService,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        transcription: TranscriptionService,
        tutor: TutorService,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, transcription, tutor }) }
    }

    pub(crate) fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let transcription = TranscriptionService::from_settings(&settings)?;
        let tutor = TutorService::from_settings(&settings)?;
        Ok(Self::new(settings, transcription, tutor))
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn transcription(&self) -> &TranscriptionService {
        &self.inner.transcription
    }

    pub(crate) fn tutor(&self) -> &TutorService {
        &self.inner.tutor
    }
}

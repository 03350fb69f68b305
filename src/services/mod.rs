pub(crate) mod data_url;
pub(crate) mod transcription;
pub(crate) mod tutor;
pub(crate) mod upstream;

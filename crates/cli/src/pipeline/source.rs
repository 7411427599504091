//! Frame source selection for the relay.

use std::path::PathBuf;

use bytes::Bytes;
use frame_codec::FrameCodec;
use ingestion::{
    FrameSupplier, ReplayFrameSource, SimulatedFrameSource, SimulationConfig,
    SourceMetricsSnapshot,
};

use crate::error::CliError;

/// What to build the source from
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Simulated(SimulationConfig),
    Replay(PathBuf),
}

/// The source driving one relay run
pub enum RelaySource {
    Simulated(SimulatedFrameSource),
    Replay(ReplayFrameSource),
}

impl RelaySource {
    pub fn build(spec: &SourceSpec, codec: &FrameCodec) -> Result<Self, CliError> {
        match spec {
            SourceSpec::Simulated(config) => Ok(Self::Simulated(SimulatedFrameSource::new(
                codec.clone(),
                config.clone(),
            ))),
            SourceSpec::Replay(path) => ReplayFrameSource::from_path(path)
                .map(Self::Replay)
                .map_err(|e| CliError::replay_load(path, e.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Simulated(_) => "simulated",
            Self::Replay(_) => "replay",
        }
    }

    pub fn metrics(&self) -> SourceMetricsSnapshot {
        match self {
            Self::Simulated(source) => source.metrics().snapshot(),
            Self::Replay(source) => source.metrics().snapshot(),
        }
    }
}

impl FrameSupplier for RelaySource {
    async fn next_frame(&mut self) -> Option<Bytes> {
        match self {
            Self::Simulated(source) => source.next_frame().await,
            Self::Replay(source) => source.next_frame().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    fn codec() -> FrameCodec {
        let content = include_str!("../../../../configs/telemetry.toml");
        let blueprint =
            config_loader::ConfigLoader::load_from_str(content, config_loader::ConfigFormat::Toml)
                .unwrap();
        FrameCodec::new(Arc::new(blueprint.schema))
    }

    #[tokio::test]
    async fn test_simulated_source_supplies_frames() {
        let spec = SourceSpec::Simulated(SimulationConfig {
            seed: Some(3),
            ..Default::default()
        });
        let mut source = RelaySource::build(&spec, &codec()).unwrap();
        assert_eq!(source.kind(), "simulated");
        assert_eq!(source.next_frame().await.map(|f| f.len()), Some(20));
        assert_eq!(source.metrics().frames_supplied, 1);
    }

    #[tokio::test]
    async fn test_replay_source_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# recorded pass").unwrap();
        writeln!(file, "ABCD 000003E8").unwrap();
        let spec = SourceSpec::Replay(file.path().to_path_buf());

        let mut source = RelaySource::build(&spec, &codec()).unwrap();
        assert_eq!(source.kind(), "replay");
        assert_eq!(
            source.next_frame().await,
            Some(Bytes::from_static(&[0xAB, 0xCD, 0x00, 0x00, 0x03, 0xE8]))
        );
        assert!(source.next_frame().await.is_none());
    }

    #[test]
    fn test_missing_replay_file() {
        let spec = SourceSpec::Replay(PathBuf::from("/nonexistent/frames.hex"));
        let err = RelaySource::build(&spec, &codec()).err().unwrap();
        assert!(matches!(err, CliError::ReplayLoad { .. }));
    }
}

//! Relay run statistics.

use dispatcher::RunSummary;
use ingestion::SourceMetricsSnapshot;

/// Statistics from a relay run
#[derive(Debug, Clone)]
pub struct RelayStats {
    pub source_kind: &'static str,

    /// Counters kept by the frame source
    pub source: SourceMetricsSnapshot,

    /// Pipeline result
    pub summary: RunSummary,
}

impl RelayStats {
    /// Decoded frames per second
    pub fn fps(&self) -> f64 {
        let secs = self.summary.duration.as_secs_f64();
        if secs > 0.0 {
            self.summary.frames_decoded as f64 / secs
        } else {
            0.0
        }
    }

    /// Rejected frames as a percentage of frames seen
    pub fn reject_rate(&self) -> f64 {
        let seen = self.summary.frames_decoded + self.summary.frames_rejected;
        if seen > 0 {
            self.summary.frames_rejected as f64 / seen as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        let s = &self.summary;
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Relay Statistics                          ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Overview");
        println!("   ├─ Outcome: {}", s.outcome);
        println!("   ├─ Duration: {:.2}s", s.duration.as_secs_f64());
        println!("   ├─ Frames decoded: {}", s.frames_decoded);
        println!(
            "   ├─ Frames rejected: {} ({:.2}%)",
            s.frames_rejected,
            self.reject_rate()
        );
        println!("   ├─ Source failures: {}", s.source_failures);
        println!("   ├─ FPS: {:.2}", self.fps());
        println!("   └─ Decode latency (us): {}", s.decode_latency_us);

        println!("\nSource ({})", self.source_kind);
        println!("   ├─ Frames supplied: {}", self.source.frames_supplied);
        println!("   ├─ Empty pulls: {}", self.source.failures);
        println!("   └─ Corrupted: {}", self.source.corrupted);

        println!("\nHandlers");
        for (name, metrics) in &s.handlers {
            println!("   ├─ {name}: {metrics}");
        }
        for name in &s.excluded_handlers {
            println!("   ├─ {name}: excluded (setup failed)");
        }
        println!("   └─ Envelopes lost: {}", s.envelopes_lost());

        println!();
    }
}

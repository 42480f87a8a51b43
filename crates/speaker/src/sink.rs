use speaker_engine::Transport;
use speaker_engine::transport::{EncodedFrame, TrackInfo};
use speaker_types::PlaybackEndReason;

/// Duplicates every frame and lifecycle call to a list of transports.
#[derive(Default)]
pub struct FanoutTransport {
    sinks: Vec<Box<dyn Transport>>,
    frames: u64,
    bytes: u64,
}

impl FanoutTransport {
    pub fn push(&mut self, sink: Box<dyn Transport>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Frames handed to this fanout (counted once, not per sink).
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Transport for FanoutTransport {
    fn send(&mut self, frame: EncodedFrame) {
        self.frames += 1;
        self.bytes += frame.len() as u64;
        if let Some((last, rest)) = self.sinks.split_last_mut() {
            for sink in rest {
                sink.send(frame.clone());
            }
            last.send(frame);
        }
    }

    fn begin(&mut self, emitter_id: u8, info: TrackInfo) {
        for sink in &mut self.sinks {
            sink.begin(emitter_id, info);
        }
    }

    fn end(&mut self, emitter_id: u8, reason: PlaybackEndReason) {
        for sink in &mut self.sinks {
            sink.end(emitter_id, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speaker_engine::transport::ChannelTransport;

    #[test]
    fn every_sink_sees_every_frame() {
        let (tx_a, rx_a) = crossbeam_channel::unbounded();
        let (tx_b, rx_b) = crossbeam_channel::unbounded();
        let mut fanout = FanoutTransport::default();
        fanout.push(Box::new(ChannelTransport::new(tx_a)));
        fanout.push(Box::new(ChannelTransport::new(tx_b)));

        for i in 0..3u8 {
            fanout.send(EncodedFrame {
                emitter_id: 1,
                payload: vec![i; 10],
            });
        }

        assert_eq!(fanout.frames(), 3);
        assert_eq!(fanout.bytes(), 30);
        assert_eq!(rx_a.try_iter().count(), 3);
        assert_eq!(rx_b.try_iter().count(), 3);
    }

    #[test]
    fn empty_fanout_still_counts() {
        let mut fanout = FanoutTransport::default();
        assert!(fanout.is_empty());
        fanout.send(EncodedFrame {
            emitter_id: 0,
            payload: vec![0; 4],
        });
        assert_eq!(fanout.frames(), 1);
    }
}

use std::collections::VecDeque;
use crate::scanner::{RawFrame, ScanError};
/// Something that can produce one raw frame per request.
///
/// `acquire` blocks until a full frame arrives, the link's timeout elapses
/// (`LinkTimeout`) or the transport closes (`LinkDisconnected`). Garbled
/// payloads are discarded and reported as `FrameParse`.
pub trait DeviceLink: Send {
    fn acquire(&mut self) -> Result<RawFrame, ScanError>;
    fn channel_count(&self) -> usize;
    /// Short human readable description, e.g. `serial:/dev/ttyACM0`.
    fn describe(&self) -> String;
    fn is_synthetic(&self) -> bool {
        false
    }
}
impl<L: DeviceLink + ?Sized> DeviceLink for Box<L> {
    fn acquire(&mut self) -> Result<RawFrame, ScanError> {
        (**self).acquire()
    }
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }
    fn describe(&self) -> String {
        (**self).describe()
    }
    fn is_synthetic(&self) -> bool {
        (**self).is_synthetic()
    }
}
/// Scripted link for tests and deterministic playback.
///
/// Once the script is exhausted every call reports `LinkDisconnected`.
pub struct ManualLink {
    channels: usize,
    script: VecDeque<Result<RawFrame, ScanError>>,
}
impl ManualLink {
    pub fn new(
        channels: usize,
        script: impl IntoIterator<Item = Result<RawFrame, ScanError>>,
    ) -> Self {
        Self {
            channels,
            script: script.into_iter().collect(),
        }
    }
    pub fn from_frames(channels: usize, frames: impl IntoIterator<Item = RawFrame>) -> Self {
        Self::new(channels, frames.into_iter().map(Ok))
    }
    pub fn push(&mut self, item: Result<RawFrame, ScanError>) {
        self.script.push_back(item);
    }
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}
impl DeviceLink for ManualLink {
    fn acquire(&mut self) -> Result<RawFrame, ScanError> {
        let frame = self
            .script
            .pop_front()
            .unwrap_or_else(|| {
                Err(ScanError::LinkDisconnected {
                    reason: "manual script exhausted".into(),
                })
            })?;
        if frame.num_channels() != self.channels {
            return Err(ScanError::FrameParse {
                reason: format!(
                    "expected {} fields, got {}",
                    self.channels,
                    frame.num_channels()
                ),
            });
        }
        Ok(frame)
    }
    fn channel_count(&self) -> usize {
        self.channels
    }
    fn describe(&self) -> String {
        "manual".into()
    }
}

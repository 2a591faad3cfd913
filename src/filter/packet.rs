//! Host packet type.

/// One audio packet as exchanged with the host: planar f32 samples, one
/// `Vec` per channel, all the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    /// Planar samples, `data[channel][frame]`.
    pub data: Vec<Vec<f32>>,
    /// Frames per channel.
    pub frames: u32,
    /// Host timestamp, monotonically non-decreasing across packets.
    pub timestamp: u64,
}

impl AudioPacket {
    /// Build a packet from planar channel data.
    ///
    /// # Panics
    ///
    /// Panics if the channels have differing lengths.
    pub fn new(data: Vec<Vec<f32>>, timestamp: u64) -> Self {
        let frames = data.first().map_or(0, |c| c.len());
        assert!(
            data.iter().all(|c| c.len() == frames),
            "planar channels must have equal lengths"
        );
        Self {
            data,
            frames: frames as u32,
            timestamp,
        }
    }

    /// Packet duration in milliseconds at the given sample rate.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        self.frames * 1000 / sample_rate
    }
}

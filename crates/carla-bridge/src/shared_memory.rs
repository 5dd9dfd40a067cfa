//! The fixed-size audio page shared between parent and child (§6):
//! block-size, sample-rate and input/output audio samples. Transport and
//! events travel over the control channel alongside `ProcessAudio` instead
//! of being packed into the raw page, since they are variable-length and the
//! page itself must stay a fixed `mmap`-friendly size.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

/// A named, `mmap`-backed block of audio samples, channel-major
/// (`channel * max_block_size + sample`). One page holds either the input
/// or the output side of a block; the bridge plugin owns one of each.
pub struct SharedAudioBuffer {
    path: PathBuf,
    mmap: MmapMut,
    channels: usize,
    max_block_size: usize,
}

impl SharedAudioBuffer {
    pub fn create(name: &str, channels: usize, max_block_size: usize) -> io::Result<Self> {
        let path = std::env::temp_dir().join(name);
        let size = channels * max_block_size * std::mem::size_of::<f32>();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(size as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            path,
            mmap,
            channels,
            max_block_size,
        })
    }

    pub fn open(name: &str, channels: usize, max_block_size: usize) -> io::Result<Self> {
        let path = std::env::temp_dir().join(name);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            path,
            mmap,
            channels,
            max_block_size,
        })
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn channel_offset(&self, channel: usize) -> usize {
        channel * self.max_block_size * std::mem::size_of::<f32>()
    }

    pub fn write_channel(&mut self, channel: usize, samples: &[f32]) {
        debug_assert!(channel < self.channels);
        debug_assert!(samples.len() <= self.max_block_size);
        let offset = self.channel_offset(channel);
        let bytes = bytemuck_cast(samples);
        self.mmap[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read_channel(&self, channel: usize, num_samples: usize) -> Vec<f32> {
        debug_assert!(channel < self.channels);
        let offset = self.channel_offset(channel);
        let byte_len = num_samples * std::mem::size_of::<f32>();
        let bytes = &self.mmap[offset..offset + byte_len];
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl Drop for SharedAudioBuffer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn bytemuck_cast(samples: &[f32]) -> &[u8] {
    // Safety: `f32` has no padding/alignment requirements beyond its own
    // size, and the slice outlives the returned view.
    unsafe {
        std::slice::from_raw_parts(samples.as_ptr() as *const u8, samples.len() * 4)
    }
}

pub fn unique_shm_name(prefix: &str, suffix: &str) -> String {
    format!("{prefix}{}_{suffix}", std::process::id())
}

pub fn path_for(name: &str) -> PathBuf {
    std::env::temp_dir().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_channel_roundtrips() {
        let name = unique_shm_name("carla_test_", "audio");
        let mut buf = SharedAudioBuffer::create(&name, 2, 64).unwrap();
        let samples: Vec<f32> = (0..64).map(|i| i as f32 * 0.5).collect();
        buf.write_channel(0, &samples);
        let read_back = buf.read_channel(0, 64);
        assert_eq!(read_back, samples);
    }

    #[test]
    fn open_sees_writes_from_create_handle() {
        let name = unique_shm_name("carla_test_", "shared");
        let mut writer = SharedAudioBuffer::create(&name, 1, 16).unwrap();
        writer.write_channel(0, &[1.0, 2.0, 3.0]);

        let reader = SharedAudioBuffer::open(&name, 1, 16).unwrap();
        assert_eq!(reader.read_channel(0, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn drop_removes_backing_file() {
        let name = unique_shm_name("carla_test_", "cleanup");
        let path = {
            let buf = SharedAudioBuffer::create(&name, 1, 4).unwrap();
            path_for(&buf.name())
        };
        assert!(!path.exists());
    }
}

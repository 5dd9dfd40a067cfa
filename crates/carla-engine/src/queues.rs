//! RT-safe command/event rings between the control thread and the audio
//! thread (§5), grounded on the teacher's `midi_producer`/`midi_consumer`
//! SPSC pair in `tutti-plugin/src/client.rs`. Both directions use a
//! `ringbuf::HeapRb` split into producer/consumer halves; the control
//! thread owns one half of each ring, the RT thread owns the other, and
//! neither ever blocks.

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Sized comfortably above one block's worth of note/parameter events
/// (§5: "at least 512 entries").
pub const RING_CAPACITY: usize = 512;

/// Control thread → RT thread (§5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RtCommand {
    PluginEnable { plugin_id: u32, enabled: bool },
    SetParam { plugin_id: u32, index: u32, value: f32 },
    SetProgram { plugin_id: u32, index: i32 },
    SetMidiProgram { plugin_id: u32, index: i32 },
    NoteOn { plugin_id: u32, channel: u8, note: u8, velocity: u8 },
    NoteOff { plugin_id: u32, channel: u8, note: u8 },
    PanicAll,
}

/// RT thread → control thread (§5): post-process feedback (the value a
/// parameter actually clamped to, peak levels, crash notifications, …).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PostRtEventKind {
    ParameterChanged,
    ProgramChanged,
    MidiProgramChanged,
    NoteOn,
    NoteOff,
    PluginCrashed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostRtEvent {
    pub plugin_id: u32,
    pub kind: PostRtEventKind,
    pub v1: i32,
    pub v2: i32,
    pub v3: f32,
}

/// The control-thread-side handle to the command ring: push commands,
/// never pop.
pub struct RtCommandSender {
    inner: HeapProd<RtCommand>,
}

impl RtCommandSender {
    /// Non-blocking; returns `false` if the ring is full rather than ever
    /// waiting on the RT thread (§5 invariant: the control thread must
    /// never be made to wait on audio-thread progress, and the reverse
    /// holds too). §5 also says drops must not happen in practice — that
    /// is a sizing requirement on the caller (`RING_CAPACITY` is chosen to
    /// exceed the highest legal per-block write burst), not a guarantee
    /// this call makes; a burst that does exceed capacity still has to
    /// fail non-blockingly rather than stall the control thread.
    pub fn send(&mut self, command: RtCommand) -> bool {
        self.inner.try_push(command).is_ok()
    }
}

/// The RT-thread-side handle to the command ring: drain commands, never
/// push. `unsafe impl Send` is not needed here — `HeapCons` is already
/// `Send` when `T: Send`, which every variant above is.
pub struct RtCommandReceiver {
    inner: HeapCons<RtCommand>,
}

impl RtCommandReceiver {
    pub fn drain(&mut self) -> impl Iterator<Item = RtCommand> + '_ {
        std::iter::from_fn(move || self.inner.try_pop())
    }
}

pub struct PostRtEventSender {
    inner: HeapProd<PostRtEvent>,
}

impl PostRtEventSender {
    pub fn send(&mut self, event: PostRtEvent) -> bool {
        self.inner.try_push(event).is_ok()
    }
}

pub struct PostRtEventReceiver {
    inner: HeapCons<PostRtEvent>,
}

impl PostRtEventReceiver {
    pub fn drain(&mut self) -> impl Iterator<Item = PostRtEvent> + '_ {
        std::iter::from_fn(move || self.inner.try_pop())
    }
}

/// Builds one command ring and one post-RT-event ring, returning the two
/// halves of each already paired up for their respective owners.
pub fn build_queues(
    capacity: usize,
) -> (
    RtCommandSender,
    RtCommandReceiver,
    PostRtEventSender,
    PostRtEventReceiver,
) {
    let (cmd_prod, cmd_cons) = HeapRb::<RtCommand>::new(capacity).split();
    let (evt_prod, evt_cons) = HeapRb::<PostRtEvent>::new(capacity).split();
    (
        RtCommandSender { inner: cmd_prod },
        RtCommandReceiver { inner: cmd_cons },
        PostRtEventSender { inner: evt_prod },
        PostRtEventReceiver { inner: evt_cons },
    )
}

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SaveState {
    None = 0,
    Save = 1,
    Unload = 2,
    UnloadSave = 3,
    Unloaded = 4,
}

/// Side effects owed after draining a state at snapshot time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Drained {
    pub save: bool,
    pub unload: bool,
}

impl SaveState {
    pub const ALL: [SaveState; 5] = [
        SaveState::None,
        SaveState::Save,
        SaveState::Unload,
        SaveState::UnloadSave,
        SaveState::Unloaded,
    ];

    fn from_u8(v: u8) -> SaveState {
        match v {
            0 => SaveState::None,
            1 => SaveState::Save,
            2 => SaveState::Unload,
            3 => SaveState::UnloadSave,
            _ => SaveState::Unloaded,
        }
    }

    pub fn mark_save(self) -> SaveState {
        match self {
            SaveState::None | SaveState::Save => SaveState::Save,
            SaveState::Unload | SaveState::UnloadSave => SaveState::UnloadSave,
            SaveState::Unloaded => SaveState::Unloaded,
        }
    }

    pub fn mark_unload(self, persist: bool) -> SaveState {
        match self {
            SaveState::None | SaveState::Unload if persist => SaveState::UnloadSave,
            SaveState::None | SaveState::Unload => SaveState::Unload,
            SaveState::Save | SaveState::UnloadSave => SaveState::UnloadSave,
            SaveState::Unloaded => SaveState::Unloaded,
        }
    }

    pub fn cancel_unload(self) -> SaveState {
        match self {
            SaveState::Unload => SaveState::None,
            SaveState::UnloadSave => SaveState::Save,
            other => other,
        }
    }

    /// Next state after a snapshot plus the effects the drained state owes.
    pub fn drain(self) -> (SaveState, Drained) {
        match self {
            SaveState::Save => (SaveState::None, Drained { save: true, unload: false }),
            SaveState::UnloadSave => (SaveState::Unload, Drained { save: true, unload: true }),
            SaveState::Unload => (SaveState::Unload, Drained { save: false, unload: true }),
            other => (other, Drained::default()),
        }
    }

    pub fn is_unloaded(self) -> bool {
        self == SaveState::Unloaded
    }
}

/// Lock-free cell for a chunk's save state; every transition is one
/// read-compare-write loop over the pure functions above.
pub struct AtomicSaveState(AtomicU8);

impl Default for AtomicSaveState {
    fn default() -> Self {
        Self(AtomicU8::new(SaveState::None as u8))
    }
}

impl AtomicSaveState {
    pub fn get(&self) -> SaveState {
        SaveState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Applies `f` atomically, returning `(old, new)`.
    fn update(&self, mut f: impl FnMut(SaveState) -> SaveState) -> (SaveState, SaveState) {
        let mut cur = self.0.load(Ordering::Acquire);
        loop {
            let old = SaveState::from_u8(cur);
            let new = f(old);
            if new == old {
                return (old, new);
            }
            match self
                .0
                .compare_exchange_weak(cur, new as u8, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return (old, new),
                Err(actual) => cur = actual,
            }
        }
    }

    /// False if the chunk is already unloaded.
    pub fn mark_save(&self) -> bool {
        !self.update(SaveState::mark_save).0.is_unloaded()
    }

    pub fn mark_unload(&self, persist: bool) -> bool {
        !self.update(|s| s.mark_unload(persist)).0.is_unloaded()
    }

    /// Returns true if the chunk had already been unloaded; the caller then
    /// holds a dead handle and must fetch the chunk again.
    pub fn cancel_unload(&self) -> bool {
        self.update(SaveState::cancel_unload).0.is_unloaded()
    }

    pub fn drain_for_snapshot(&self) -> Drained {
        let mut drained = Drained::default();
        self.update(|s| {
            let (next, d) = s.drain();
            drained = d;
            next
        });
        drained
    }

    /// Moves to the terminal state; `None` if it was already there.
    pub fn set_unloaded(&self) -> Option<SaveState> {
        let old = SaveState::from_u8(self.0.swap(SaveState::Unloaded as u8, Ordering::AcqRel));
        if old.is_unloaded() { None } else { Some(old) }
    }
}

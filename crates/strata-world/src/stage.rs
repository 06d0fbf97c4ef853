use std::error::Error;
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Small process-unique id for the calling thread. Never zero.
#[inline]
pub fn thread_token() -> u64 {
    THREAD_TOKEN.with(|t| *t)
}

/// A tick stage, or a set of stages when combined with `|`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stage(pub u32);

impl Stage {
    /// Scheduler not running; setup and shutdown happen here.
    pub const IDLE: Stage = Stage(1 << 0);
    pub const TICKSTART: Stage = Stage(1 << 1);
    pub const PHYSICS: Stage = Stage(1 << 2);
    pub const GLOBAL_PHYSICS: Stage = Stage(1 << 3);
    pub const DYNAMIC_BLOCKS: Stage = Stage(1 << 4);
    pub const GLOBAL_DYNAMIC_BLOCKS: Stage = Stage(1 << 5);
    pub const LIGHTING: Stage = Stage(1 << 6);
    pub const FINALIZE: Stage = Stage(1 << 7);
    pub const PRESNAPSHOT: Stage = Stage(1 << 8);
    pub const SNAPSHOT: Stage = Stage(1 << 9);

    /// Stages in which the owning region thread may write block data.
    pub const REGION_WRITE: Stage = Stage(
        Self::TICKSTART.0
            | Self::PHYSICS.0
            | Self::GLOBAL_PHYSICS.0
            | Self::DYNAMIC_BLOCKS.0
            | Self::GLOBAL_DYNAMIC_BLOCKS.0
            | Self::FINALIZE.0,
    );
    /// Stages in which the main thread may write block data.
    pub const MAIN_WRITE: Stage = Stage(Self::IDLE.0 | Self::TICKSTART.0 | Self::FINALIZE.0);
    pub const MAIN_LIGHT_WRITE: Stage = Stage(Self::MAIN_WRITE.0 | Self::LIGHTING.0);

    #[inline]
    pub fn intersects(self, other: Stage) -> bool {
        self.0 & other.0 != 0
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::IDLE => "idle",
            Stage::TICKSTART => "tickstart",
            Stage::PHYSICS => "physics",
            Stage::GLOBAL_PHYSICS => "global_physics",
            Stage::DYNAMIC_BLOCKS => "dynamic_blocks",
            Stage::GLOBAL_DYNAMIC_BLOCKS => "global_dynamic_blocks",
            Stage::LIGHTING => "lighting",
            Stage::FINALIZE => "finalize",
            Stage::PRESNAPSHOT => "presnapshot",
            Stage::SNAPSHOT => "snapshot",
            _ => "mixed",
        }
    }
}

impl BitOr for Stage {
    type Output = Stage;

    fn bitor(self, rhs: Stage) -> Stage {
        Stage(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageViolation {
    pub stage: Stage,
    pub thread: u64,
    pub owner: u64,
    pub main: u64,
}

impl fmt::Display for StageViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "write attempted in stage {} from thread {} (owner={}, main={})",
            self.stage.name(),
            self.thread,
            self.owner,
            self.main
        )
    }
}

impl Error for StageViolation {}

/// Global stage and main-thread identity shared by every region of a world.
#[derive(Debug)]
pub struct TickClock {
    stage: AtomicU32,
    main: AtomicU64,
    tick: AtomicU64,
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickClock {
    /// Starts idle with the calling thread as main.
    pub fn new() -> Self {
        Self {
            stage: AtomicU32::new(Stage::IDLE.0),
            main: AtomicU64::new(thread_token()),
            tick: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        Stage(self.stage.load(Ordering::Acquire))
    }

    pub fn set_stage(&self, stage: Stage) {
        self.stage.store(stage.0, Ordering::Release);
    }

    pub fn bind_main_thread(&self) {
        self.main.store(thread_token(), Ordering::Release);
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    pub fn advance_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Admits the caller if it is `owner` during `owner_stages`, or the main
    /// thread during `main_stages`.
    pub fn check(&self, owner: u64, owner_stages: Stage, main_stages: Stage) -> Result<(), StageViolation> {
        let stage = self.stage();
        let me = thread_token();
        let main = self.main.load(Ordering::Acquire);
        if owner != 0 && me == owner && stage.intersects(owner_stages) {
            return Ok(());
        }
        if me == main && stage.intersects(main_stages) {
            return Ok(());
        }
        Err(StageViolation {
            stage,
            thread: me,
            owner,
            main,
        })
    }
}

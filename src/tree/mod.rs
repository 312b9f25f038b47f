use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::alloc::{BlockAllocator, HeapAllocator};
use crate::block::{Block, BlockId, HALF, MAX_KEYS, ORDER};
use crate::cursor::{Cursor, CursorState};
use crate::error::{Result, TreeError};
use crate::stats::{ActiveStorage, TreeStats};

include!("types.rs");
include!("api.rs");
include!("leaf.rs");
include!("internal.rs");
include!("maintenance.rs");

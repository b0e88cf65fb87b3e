//! Executable program: an atom mapping plus its intrinsic catalog.

use std::fmt;
use std::sync::Arc;

use ir_system::AtomMapping;

use crate::intrinsics;
use crate::native::IntrinsicCatalog;

/// Everything needed to execute calls: sequences resolved through an
/// [`AtomMapping`] and the intrinsics those sequences may invoke.
///
/// A program is immutable once a context starts executing it; hosts
/// register extra intrinsics between construction and the first
/// invocation.
pub struct Program {
    map: Arc<dyn AtomMapping>,
    intrinsics: IntrinsicCatalog,
}

impl Program {
    /// Wraps a mapping with the built-in intrinsic set installed.
    pub fn new(map: Arc<dyn AtomMapping>) -> Self {
        let mut intrinsics = IntrinsicCatalog::new();
        intrinsics::install_console_intrinsics(&mut intrinsics);
        Program { map, intrinsics }
    }

    /// Wraps a mapping with a caller-assembled catalog. Nothing is
    /// installed implicitly.
    pub fn with_catalog(map: Arc<dyn AtomMapping>, intrinsics: IntrinsicCatalog) -> Self {
        Program { map, intrinsics }
    }

    /// The mapping sequences and metadata are resolved through.
    pub fn mapping(&self) -> &dyn AtomMapping {
        self.map.as_ref()
    }

    /// The intrinsic catalog.
    pub fn intrinsics(&self) -> &IntrinsicCatalog {
        &self.intrinsics
    }

    /// Mutable catalog access, for hosts adding intrinsics.
    pub fn intrinsics_mut(&mut self) -> &mut IntrinsicCatalog {
        &mut self.intrinsics
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("intrinsics", &self.intrinsics.len())
            .finish_non_exhaustive()
    }
}

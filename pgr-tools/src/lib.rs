//! Small helpers shared by several components: checksums, user/group lookup,
//! and filesystem primitives (ownership/mode/time application, path creation).

pub mod checksum;
pub mod env;
pub mod fs;
pub mod ident;

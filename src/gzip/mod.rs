//! Gzip container (RFC 1952)
//!
//! A gzip file is a concatenation of independently compressed members with
//! no index, so member boundaries and the decoded size are only known after
//! decoding each member once at open time.
//!
//! ```text
//! parent:  [hdr|deflate body|ftr][hdr|deflate body|ftr] ...
//!                  │                     │
//! decoded: [ member 0 .........][ member 1 ...........] ...
//!          0               end_0                  end_1
//! ```
//!
//! Reads locate the owning member through an ordered map keyed by each
//! member's decoded end offset, then go through that member's bounded
//! decode window.
//!
//! ## Module Structure
//! ```text
//! gzip/
//! ├── mod.rs     - re-exports
//! ├── types.rs   - header, footer and verification structures
//! ├── member.rs  - GzipMember parsing and decode window
//! └── file.rs    - GzipFile (FileIo over all members)
//! ```

mod file;
mod member;
pub mod types;

pub use file::GzipFile;
pub use member::GzipMember;
pub use types::{GzipFooter, GzipMemberHeader, MemberVerification, VerifyStatus};

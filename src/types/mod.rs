mod metadata;

pub use metadata::{
    FileType, Metadata, Xattrs, MODE_ALL, MODE_BASE, MODE_SETGID, MODE_SETUID, MODE_STICKY,
};

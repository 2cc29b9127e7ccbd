pub mod upload;

pub use upload::{
    AcceptedName, CollisionPolicy, IncomingFile, UploadError, UploadGate, UploadRejection,
    UploadedFile,
};

use nix::errno::Errno;

pub type Result<T> = std::result::Result<T, Error>;

/// Every fallible operation in this crate resolves to one of these kinds.
///
/// Signal interruption and descriptor invalidation during event monitoring
/// are control results, not failures; they are reported through
/// [`PollOutcome::Interrupted`](crate::monitor::PollOutcome) and
/// [`MonitorEntry::Invalidated`](crate::monitor::MonitorEntry) instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The chip does not exist, or an offset lies outside its line count.
    #[error("GPIO chip or line not found: {0}")]
    NotFound(String),

    /// One or more of the requested lines is already held by another
    /// consumer. The kernel does not report which one.
    #[error("one or more requested lines are already in use")]
    Busy,

    /// Rejected before any kernel call: incompatible flag combinations,
    /// wrong-length value sequences, writes to non-output lines, and the
    /// like.
    #[error("invalid line configuration: {0}")]
    InvalidConfig(String),

    /// Access control refused the chip or line request.
    #[error("permission denied for GPIO device")]
    PermissionDenied,

    /// The request backing this handle has been released or invalidated;
    /// its descriptor is gone.
    #[error("line request is closed")]
    Closed,

    /// A handle was released twice. The shared count is only decremented
    /// on the first release.
    #[error("line handle was already released")]
    DoubleRelease,

    /// The kernel interface fixes this setting at request time.
    #[error("unsupported reconfiguration: {0}")]
    Unsupported(String),

    /// Any other kernel-call failure; the raw OS code is preserved.
    #[error("GPIO I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps errno from a line-request or chip ioctl into the taxonomy.
    pub(crate) fn from_request_errno(err: Errno) -> Self {
        match err {
            Errno::EBUSY => Error::Busy,
            Errno::EINVAL => Error::InvalidConfig("rejected by the kernel".into()),
            Errno::EPERM | Errno::EACCES => Error::PermissionDenied,
            Errno::ENOENT | Errno::ENXIO | Errno::ENODEV => {
                Error::NotFound("device vanished or offset out of range".into())
            }
            other => Error::Io(std::io::Error::from_raw_os_error(other as i32)),
        }
    }

    /// Maps errno from an operation on an already-open request descriptor.
    /// Loss of the underlying device surfaces as `Closed`.
    pub(crate) fn from_handle_errno(err: Errno) -> Self {
        match err {
            Errno::ENODEV | Errno::EBADF => Error::Closed,
            Errno::EPERM | Errno::EACCES => Error::PermissionDenied,
            Errno::EINVAL => Error::InvalidConfig("rejected by the kernel".into()),
            other => Error::Io(std::io::Error::from_raw_os_error(other as i32)),
        }
    }
}

impl From<Errno> for Error {
    fn from(err: Errno) -> Self {
        Error::Io(std::io::Error::from_raw_os_error(err as i32))
    }
}

#![cfg(unix)]
use std::io;
use std::os::unix::io::RawFd;

/// Readiness interest for a registered descriptor
#[derive(Debug, Clone, Copy)]
pub struct Interest {
    read: bool,
    write: bool,
}

impl Interest {
    pub fn readable() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    pub fn writable() -> Self {
        Self {
            read: false,
            write: true,
        }
    }

    fn bits(&self) -> u32 {
        let mut events = 0u32;
        if self.read {
            events |= libc::EPOLLIN as u32;
        }
        if self.write {
            events |= libc::EPOLLOUT as u32;
        }
        events
    }
}

/// One readiness notification
pub struct SocketEvent {
    pub fd: RawFd,
    pub can_read: bool,
    pub can_write: bool,
    pub has_error: bool,
    pub hung_up: bool,
}

/// Epoll wrapper for monitoring multiple file descriptors
pub struct Epoll {
    epoll_fd: RawFd,
}

impl Epoll {
    pub fn create() -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epoll_fd })
    }

    /// Start watching a descriptor
    pub fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, interest.bits())
    }

    /// Change the interest of an already-registered descriptor
    pub fn modify(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, interest.bits())
    }

    /// Stop watching a descriptor
    pub fn unregister(&self, fd: RawFd) -> io::Result<()> {
        let result =
            unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let result = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut event) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Wait for events with a timeout in milliseconds
    pub fn poll(&self, timeout_ms: i32) -> io::Result<Vec<SocketEvent>> {
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; 64];

        let count = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                events.as_mut_ptr(),
                events.len() as i32,
                timeout_ms,
            )
        };

        if count < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        let mut result = Vec::with_capacity(count as usize);
        for event in &events[..count as usize] {
            result.push(SocketEvent {
                fd: event.u64 as RawFd,
                can_read: (event.events & libc::EPOLLIN as u32) != 0,
                can_write: (event.events & libc::EPOLLOUT as u32) != 0,
                has_error: (event.events & libc::EPOLLERR as u32) != 0,
                hung_up: (event.events & libc::EPOLLHUP as u32) != 0,
            });
        }

        Ok(result)
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll_fd) };
    }
}

//! Devices, requests and the event queue
//!
//! A device is a table of commands. Running a command returns a status:
//!
//! | Status   | Meaning                                          |
//! |----------|--------------------------------------------------|
//! | negative | failed; the request's `error` holds the code     |
//! | zero     | done; an event is posted for the request's port  |
//! | positive | pending; the request is queued and polled        |
//!
//! `poll` re-runs every pending request once. `wait` drives `poll` until an
//! event shows up or its timeout runs out.
//!
//! The only built-in device is `timer`, whose `start` command completes once
//! the requested duration has elapsed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const STATUS_DONE: i32 = 0;
pub const STATUS_PENDING: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u16);

/// Command implementation; returns the status described in the module docs
pub type CommandFn = fn(&mut Request) -> i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestFlags(u8);

impl RequestFlags {
    pub const NONE: RequestFlags = RequestFlags(0);
    pub const OPEN: RequestFlags = RequestFlags(1);
    pub const PENDING: RequestFlags = RequestFlags(1 << 1);
    pub const DONE: RequestFlags = RequestFlags(1 << 2);

    pub fn contains(self, other: RequestFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RequestFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: RequestFlags) {
        self.0 &= !other.0;
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub device: DeviceId,
    pub command: usize,
    pub flags: RequestFlags,
    /// Milliseconds; 0 means no timeout
    pub timeout: u64,
    pub length: usize,
    pub actual: usize,
    pub data: Vec<u8>,
    pub error: i32,
    /// Set by the table when the request is first dispatched
    pub issued: Option<Instant>,
    /// Chains requests queued together
    pub next: Option<Box<Request>>,
}

impl Request {
    pub fn new(device: DeviceId, command: usize) -> Self {
        Request {
            device,
            command,
            flags: RequestFlags::NONE,
            timeout: 0,
            length: 0,
            actual: 0,
            data: Vec::new(),
            error: 0,
            issued: None,
            next: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub title: &'static str,
    pub commands: Vec<(&'static str, CommandFn)>,
    pub flags: u32,
    /// Size of the request record this device expects
    pub request_size: usize,
}

impl Device {
    pub fn max_command(&self) -> usize {
        self.commands.len()
    }
}

/// Completion notice for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub device: DeviceId,
    pub command: usize,
    pub actual: usize,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn post(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn take(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no device {}", .0.0)]
    NoDevice(DeviceId),

    #[error("device {device} has no command {command}")]
    NoCommand { device: &'static str, command: usize },

    #[error("{device}/{command} failed with code {code}")]
    Failed {
        device: &'static str,
        command: &'static str,
        code: i32,
    },
}

/// Outcome of a dispatch that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Done,
    Pending,
}

#[derive(Debug, Default)]
pub struct DeviceTable {
    devices: Vec<Device>,
    pending: Vec<Request>,
    pub events: EventQueue,
}

impl DeviceTable {
    pub fn with_builtin_devices() -> Self {
        let mut table = DeviceTable::default();
        table.register(Device {
            title: "timer",
            commands: vec![("start", timer_start)],
            flags: 0,
            request_size: std::mem::size_of::<Request>(),
        });
        table
    }

    pub fn register(&mut self, device: Device) -> DeviceId {
        self.devices.push(device);
        DeviceId(self.devices.len() as u16 - 1)
    }

    pub fn find(&self, title: &str) -> Option<DeviceId> {
        self.devices
            .iter()
            .position(|d| d.title == title)
            .map(|i| DeviceId(i as u16))
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id.0 as usize)
    }

    pub fn command_index(&self, id: DeviceId, name: &str) -> Option<usize> {
        self.device(id)?.commands.iter().position(|(n, _)| *n == name)
    }

    /// Run a request's command; pending requests are queued
    pub fn dispatch(&mut self, mut request: Request) -> Result<Dispatched, DeviceError> {
        request.issued.get_or_insert_with(Instant::now);
        match self.run(&mut request)? {
            Dispatched::Done => {
                self.complete(request);
                Ok(Dispatched::Done)
            }
            Dispatched::Pending => {
                request.flags.insert(RequestFlags::PENDING);
                self.pending.push(request);
                Ok(Dispatched::Pending)
            }
        }
    }

    fn run(&self, request: &mut Request) -> Result<Dispatched, DeviceError> {
        let device = self
            .device(request.device)
            .ok_or(DeviceError::NoDevice(request.device))?;
        let Some((name, command)) = device.commands.get(request.command) else {
            return Err(DeviceError::NoCommand {
                device: device.title,
                command: request.command,
            });
        };
        let status = command(request);
        if status < 0 {
            request.error = status;
            return Err(DeviceError::Failed {
                device: device.title,
                command: *name,
                code: status,
            });
        }
        Ok(if status == STATUS_DONE {
            Dispatched::Done
        } else {
            Dispatched::Pending
        })
    }

    fn complete(&mut self, mut request: Request) {
        request.flags.remove(RequestFlags::PENDING);
        request.flags.insert(RequestFlags::DONE);
        tracing::debug!(device = request.device.0, command = request.command, "request done");
        self.events.post(Event {
            device: request.device,
            command: request.command,
            actual: request.actual,
        });
    }

    /// Re-run every pending request once; returns how many completed
    ///
    /// A request that fails while pending is dropped and its error returned
    /// after the rest have been polled.
    pub fn poll(&mut self) -> Result<usize, DeviceError> {
        let pending = std::mem::take(&mut self.pending);
        let mut done = 0;
        let mut failure = None;
        for mut request in pending {
            match self.run(&mut request) {
                Ok(Dispatched::Done) => {
                    self.complete(request);
                    done += 1;
                }
                Ok(Dispatched::Pending) => self.pending.push(request),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(done),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// `timer/start`: done once `timeout` milliseconds have passed since issue
fn timer_start(request: &mut Request) -> i32 {
    let Some(issued) = request.issued else {
        return -1;
    };
    if issued.elapsed() >= Duration::from_millis(request.timeout) {
        request.actual = request.timeout as usize;
        STATUS_DONE
    } else {
        STATUS_PENDING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(_: &mut Request) -> i32 {
        -5
    }

    #[test]
    fn test_timer_zero_completes_immediately() {
        let mut table = DeviceTable::with_builtin_devices();
        let timer = table.find("timer").unwrap();
        let start = table.command_index(timer, "start").unwrap();
        let request = Request::new(timer, start);
        assert_eq!(table.dispatch(request), Ok(Dispatched::Done));
        assert_eq!(table.events.len(), 1);
        assert_eq!(table.pending_len(), 0);
    }

    #[test]
    fn test_timer_pends_then_completes() {
        let mut table = DeviceTable::with_builtin_devices();
        let timer = table.find("timer").unwrap();
        let mut request = Request::new(timer, 0);
        request.timeout = 20;
        assert_eq!(table.dispatch(request), Ok(Dispatched::Pending));
        assert!(table.events.is_empty());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(table.poll(), Ok(1));
        let event = table.events.take().unwrap();
        assert_eq!(event.actual, 20);
    }

    #[test]
    fn test_negative_status_is_an_error() {
        let mut table = DeviceTable::default();
        let id = table.register(Device {
            title: "broken",
            commands: vec![("open", failing)],
            flags: 0,
            request_size: 0,
        });
        let err = table.dispatch(Request::new(id, 0)).unwrap_err();
        assert_eq!(
            err,
            DeviceError::Failed {
                device: "broken",
                command: "open",
                code: -5
            }
        );
        assert!(table.events.is_empty());
    }

    #[test]
    fn test_unknown_device_and_command() {
        let mut table = DeviceTable::with_builtin_devices();
        assert_eq!(
            table.dispatch(Request::new(DeviceId(9), 0)),
            Err(DeviceError::NoDevice(DeviceId(9)))
        );
        assert!(matches!(
            table.dispatch(Request::new(DeviceId(0), 4)),
            Err(DeviceError::NoCommand { .. })
        ));
    }
}

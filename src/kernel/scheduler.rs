// A simple priority-based job scheduler for cooperative multitasking
// NOTE: No dynamic allocation and uses fixed-size queues
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    PollPower,
    CheckCharge,
    ScanImages,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::PollPower => write!(f, "PollPower"),
            Job::CheckCharge => write!(f, "CheckCharge"),
            Job::ScanImages => write!(f, "ScanImages"),
        }
    }
}

/// Job priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl Job {
    pub const fn priority(&self) -> Priority {
        match self {
            // the power button must never wait behind a decode
            Job::PollPower => Priority::High,
            Job::CheckCharge => Priority::Normal,
            Job::ScanImages => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PushError {
    /// Queue for this priority level is full, contains the rejected job
    Full(Job),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(job) => write!(f, "queue full, rejected {}", job),
        }
    }
}

// ring buffer for jobs
pub struct JobQueue<const N: usize> {
    buf: [Option<Job>; N],
    head: usize, // next to read
    tail: usize, // next to write
    len: usize,
}

impl<const N: usize> JobQueue<N> {
    pub const fn new() -> Self {
        Self {
            buf: [None; N],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, job: Job) -> Result<(), Job> {
        if self.len >= N {
            return Err(job);
        }
        self.buf[self.tail] = Some(job);
        self.tail = (self.tail + 1) % N;
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Job> {
        if self.len == 0 {
            return None;
        }
        let job = self.buf[self.head].take();
        self.head = (self.head + 1) % N;
        self.len -= 1;
        job
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn contains(&self, job: &Job) -> bool {
        if self.len == 0 {
            return false;
        }
        let mut i = self.head;
        for _ in 0..self.len {
            if let Some(ref j) = self.buf[i] {
                if j == job {
                    return true;
                }
            }
            i = (i + 1) % N;
        }
        false
    }
}

impl<const N: usize> Default for JobQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

// The job scheduler
pub struct Scheduler {
    high: JobQueue<4>,
    normal: JobQueue<4>,
    low: JobQueue<4>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            high: JobQueue::new(),
            normal: JobQueue::new(),
            low: JobQueue::new(),
        }
    }

    // push a job and returns error with the job if queue is full
    pub fn push(&mut self, job: Job) -> Result<(), PushError> {
        let result = match job.priority() {
            Priority::High => self.high.push(job),
            Priority::Normal => self.normal.push(job),
            Priority::Low => self.low.push(job),
        };
        result.map_err(PushError::Full)
    }

    // Schedule a job only if it's not already queued (dedup that queue).
    pub fn push_unique(&mut self, job: Job) -> Result<(), PushError> {
        match job.priority() {
            Priority::High => {
                if self.high.contains(&job) {
                    return Ok(());
                }
                self.high.push(job).map_err(PushError::Full)
            }
            Priority::Normal => {
                if self.normal.contains(&job) {
                    return Ok(());
                }
                self.normal.push(job).map_err(PushError::Full)
            }
            Priority::Low => {
                if self.low.contains(&job) {
                    return Ok(());
                }
                self.low.push(job).map_err(PushError::Full)
            }
        }
    }

    // the next job to execute
    pub fn pop(&mut self) -> Option<Job> {
        self.high
            .pop()
            .or_else(|| self.normal.pop())
            .or_else(|| self.low.pop())
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty() && self.low.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

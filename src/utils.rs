use std::io::Write;

/// Running counter printed in place on stderr.
pub struct ProgressCounter {
    label: &'static str,
    interval: u64,
    count: u64,
}

impl ProgressCounter {
    pub fn new(label: &'static str, interval: u64) -> Self {
        let counter = Self {
            label,
            interval: interval.max(1),
            count: 0,
        };
        counter.print(0);
        counter
    }

    pub fn inc(&mut self, delta: u64) {
        let prev = self.count;
        self.count += delta;
        // Print if we crossed an interval boundary
        if prev / self.interval < self.count / self.interval {
            self.print(self.count);
        }
    }

    pub fn finish(&self) {
        self.print(self.count);
        eprintln!();
    }

    fn print(&self, current: u64) {
        eprint!("\r{}: {}", self.label, current);
        let _ = std::io::stderr().flush();
    }
}

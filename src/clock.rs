extern crate chrono;

pub trait Clock: Send + Sync {
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        return chrono::Utc::now();
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
pub struct FixedClock {
    now: std::sync::Mutex<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
impl FixedClock {
    pub fn at(rfc3339: &str) -> FixedClock {
        let now = chrono::DateTime::parse_from_rfc3339(rfc3339)
            .expect("fixed clock time")
            .with_timezone(&chrono::Utc);
        return FixedClock{now: std::sync::Mutex::new(now)};
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        return *self.now.lock().unwrap();
    }
}

use std::{sync::Arc, time::SystemTime};

use hanakago::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self);
}

#[derive(Default)]
struct LoggerImpl;

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{}", content);
    }
}

struct DateLoggerImpl {
    prefix: String,
    logger: Arc<dyn Logger>,
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        self.logger
            .log(&format!("{} {}s since epoch", self.prefix, now.as_secs()));
    }
}

/// A session, closed when its container is disposed
struct Session {
    logger: Arc<dyn Logger>,
}

impl Dispose for Session {
    fn dispose(&self) {
        self.logger.log("session closed");
    }
}

fn main() -> Result<(), Error> {
    let container = Container::new();

    // One logger for the whole container tree
    container
        .register::<dyn Logger>(|_| Ok(Arc::new(LoggerImpl)))?
        .reused_within(ReuseScope::Hierarchy);

    // A new date logger on each resolution, depending on the shared logger
    container
        .register_with::<dyn DateLogger, (String,)>(|c, (prefix,)| {
            Ok(Arc::new(DateLoggerImpl {
                prefix,
                logger: c.resolve()?,
            }))
        })?
        .reused_within(ReuseScope::None);

    // One session per container, disposed along with it
    container
        .register::<Session>(|c| Ok(Arc::new(Session { logger: c.resolve()? })))?
        .disposable();

    let request = container.create_child();
    let date_logger = request.lazy_resolve::<dyn DateLogger, (String,)>()?;
    date_logger.resolve(("[request]".to_string(),))?.log_date();

    let _session = request.resolve::<Session>()?;
    request.dispose();

    container.dispose();
    Ok(())
}

use log::LevelFilter;
use std::{path::Path, sync::Once};

pub type StrResult<T = ()> = Result<T, String>;

static INIT_LOGGING_ENTRY_POINT: Once = Once::new();

#[macro_export]
macro_rules! trace_str {
    ($expect_fmt:expr $(, $args:expr)*) => {
        Err(format!("[{}] At {}:{}", TRACE_CONTEXT, file!(), line!()) +
            ", " + &format!($expect_fmt $(, $args)*))
    };
}

#[macro_export]
macro_rules! trace_err {
    ($res:expr $(, $expect_fmt:expr $(, $args:expr)*)?) => {
        $res.map_err(|e| {
            format!("[{}] At {}:{}", TRACE_CONTEXT, file!(), line!())
                $(+ ", " + &format!($expect_fmt $(, $args)*))? +
                &format!(":\n{:?}", e)
        })
    };
}

#[macro_export]
macro_rules! trace_none {
    ($res:expr $(, $none_message_fmt:expr $(, $args:expr)*)?) => {
        $res.ok_or_else(|| {
            format!("[{}] At {}:{}", TRACE_CONTEXT, file!(), line!())
                $(+ ", " + &format!($none_message_fmt $(, $args)*))?
        })
    };
}

// The diagnostics sink is a single append-only text file. The hook layer may attach and detach
// several times in the same process, so the dispatcher is installed only once.
pub fn init_logging(log_path: &Path) -> StrResult {
    const TRACE_CONTEXT: &str = "Logging";

    let mut result = Ok(());
    INIT_LOGGING_ENTRY_POINT.call_once(|| {
        let log_file = match trace_err!(fern::log_file(log_path), "Opening {:?}", log_path) {
            Ok(file) => file,
            Err(e) => {
                result = Err(e);
                return;
            }
        };

        let dispatch = if cfg!(debug_assertions) {
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} [{}] At {}:{}: {}",
                        chrono::Local::now().format("%H:%M:%S.%f"),
                        record.level(),
                        record.file().unwrap_or("?"),
                        record.line().unwrap_or(0),
                        message
                    ))
                })
                .level(LevelFilter::Trace)
                .chain(std::io::stdout())
        } else {
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} [{}] {}",
                        chrono::Local::now().format("%H:%M:%S.%f"),
                        record.level(),
                        message
                    ))
                })
                .level(LevelFilter::Info)
        };

        result = trace_err!(dispatch.chain(log_file).apply());
    });

    result
}

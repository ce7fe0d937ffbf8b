//! 诊断通道的外部契约。
//!
//! # 教案式说明
//! - **Why**：日志汇可在运行期替换，替换必须对后续输出立即生效，设置为 `None` 后输出必须静默；
//!   十六进制转储格式被运维脚本解析，形状不能漂移。
//! - **How**：进程级日志汇只在单个测试中改动，避免并行测试互相干扰；转储形状以 proptest 覆盖。
//! - **What**：断言记录计数、级别与转储的逐字节形状。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use spark_socket::{Diagnostics, LogRecord, Severity, dump, set_log_sink, sock_log};

#[test]
fn global_sink_replacement_takes_effect_immediately() {
    let first = Arc::new(AtomicUsize::new(0));
    let second: Arc<Mutex<Vec<String>>> = Arc::default();

    let counter = Arc::clone(&first);
    set_log_sink(Some(Arc::new(move |_: &LogRecord<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
    })));
    let diag = Diagnostics::global();
    sock_log!(diag, Severity::Error, "test", "first sink {}", 1);
    assert_eq!(first.load(Ordering::SeqCst), 1);

    let lines = Arc::clone(&second);
    set_log_sink(Some(Arc::new(move |record: &LogRecord<'_>| {
        lines
            .lock()
            .expect("lines lock")
            .push(format!("{}{}", record.tag, record.severity.suffix()));
    })));
    sock_log!(diag, Severity::Important, "test", "second sink");
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(*second.lock().expect("lines lock"), vec!["test:IMP".to_owned()]);

    set_log_sink(None);
    sock_log!(diag, Severity::Error, "test", "dropped");
    assert_eq!(second.lock().expect("lines lock").len(), 1);
}

#[test]
fn dump_matches_known_vector() {
    assert_eq!(dump(&[0xDE, 0xAD]), "DE AD ");
    assert_eq!(dump(&[]), "");
}

proptest! {
    #[test]
    fn dump_has_three_chars_per_byte(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let rendered = dump(&bytes);
        prop_assert_eq!(rendered.len(), bytes.len() * 3);
        for (chunk, byte) in rendered.as_bytes().chunks(3).zip(&bytes) {
            prop_assert_eq!(chunk[2], b' ');
            let hex = std::str::from_utf8(&chunk[..2]).expect("ascii hex");
            prop_assert_eq!(hex, hex.to_uppercase());
            prop_assert_eq!(u8::from_str_radix(hex, 16).expect("valid hex"), *byte);
        }
    }
}

//! Pipeline edits against real subprocesses.

use std::sync::Arc;
use std::time::Duration;

use pex_core::pipeline::{Pipeline, Stage};
use pex_core::stream::{PAGE_SIZE, SharedSource};

const INPUT: &str = "apple\nbanana\ncherry\navocado\n";

async fn read_all(stage: &Stage) -> String {
    let mut cursor = stage.cursor();
    let mut out = Vec::new();
    let mut buf = [0u8; PAGE_SIZE];
    let read = async {
        loop {
            let n = cursor.read(&mut buf).await.expect("read stage output");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
    };
    tokio::time::timeout(Duration::from_secs(10), read)
        .await
        .expect("stage output should finish");
    String::from_utf8(out).expect("utf-8 output")
}

fn pipeline() -> Pipeline {
    Pipeline::new(SharedSource::from_text(INPUT), 3)
}

#[tokio::test]
async fn test_output_flows_through_every_stage() {
    let mut p = pipeline();
    p.edit("grep a | tr a-z A-Z | sort -r", 0).unwrap();

    assert_eq!(p.stages().len(), 4);
    assert_eq!(read_all(&p.stages()[0]).await, INPUT);
    assert_eq!(
        read_all(&p.stages()[1]).await,
        "apple\nbanana\navocado\n"
    );
    assert_eq!(
        read_all(&p.stages()[2]).await,
        "APPLE\nBANANA\nAVOCADO\n"
    );
    assert_eq!(
        read_all(&p.stages()[3]).await,
        "BANANA\nAVOCADO\nAPPLE\n"
    );
}

#[tokio::test]
async fn test_editing_middle_stage_rebuilds_suffix_only() {
    let mut p = pipeline();
    p.edit("grep a | grep n | tr a-z A-Z", 0).unwrap();

    let a = p.stages()[1].cancellation().unwrap().clone();
    let b = p.stages()[2].cancellation().unwrap().clone();
    let c = p.stages()[3].cancellation().unwrap().clone();
    let a_id = p.stages()[1].id();
    let a_source = Arc::clone(p.stages()[1].source());

    let diverge = p.edit("grep a | grep v | tr a-z A-Z", 0).unwrap();
    assert_eq!(diverge, Some(2));

    assert!(!a.is_cancelled());
    assert!(b.is_cancelled());
    assert!(c.is_cancelled());
    assert_eq!(p.stages()[1].id(), a_id);
    assert!(Arc::ptr_eq(p.stages()[1].source(), &a_source));

    let new_b = p.stages()[2].cancellation().unwrap();
    let new_c = p.stages()[3].cancellation().unwrap();
    assert!(!new_b.is_cancelled());
    assert!(!new_c.is_cancelled());

    // The rebuilt tail is wired to the rebuilt middle, not the torn-down one.
    assert_eq!(read_all(&p.stages()[2]).await, "avocado\n");
    assert_eq!(read_all(&p.stages()[3]).await, "AVOCADO\n");
}

#[tokio::test]
async fn test_surviving_upstream_output_is_replayed_to_new_stage() {
    let mut p = pipeline();
    p.edit("cat -n | grep a", 0).unwrap();
    assert_eq!(
        read_all(&p.stages()[2]).await,
        "     1\tapple\n     2\tbanana\n     4\tavocado\n"
    );

    // `cat -n` has already exited and its output is fully buffered.
    p.edit("cat -n | grep ch", 0).unwrap();
    assert_eq!(read_all(&p.stages()[2]).await, "     3\tcherry\n");
}

#[tokio::test]
async fn test_launch_failure_is_local_to_its_stage() {
    let mut p = pipeline();
    p.edit("pex-missing-program-xyz -v | tr a-z A-Z", 0).unwrap();

    assert!(p.stages()[1].is_failed());
    let error = read_all(&p.stages()[1]).await;
    assert!(error.starts_with("pex-missing-program-xyz: "), "{error:?}");

    // Downstream stages read the error text like any other output.
    let shouted = read_all(&p.stages()[2]).await;
    assert!(shouted.starts_with("PEX-MISSING-PROGRAM-XYZ: "), "{shouted:?}");
}

#[tokio::test]
async fn test_shutdown_cancels_all_running_stages() {
    let mut p = pipeline();
    p.edit("sleep 30 | cat -n", 0).unwrap();
    let tokens: Vec<_> = p
        .stages()
        .iter()
        .filter_map(|s| s.cancellation().cloned())
        .collect();
    assert_eq!(tokens.len(), 2);

    p.shutdown();
    assert!(tokens.iter().all(tokio_util::sync::CancellationToken::is_cancelled));

    // Killing `sleep` ends its output, which ends `cat`'s input.
    assert_eq!(read_all(&p.stages()[1]).await, "");
}

//! End-to-end runs of small WAT guests against the WASI host.

use std::sync::Arc;
use std::sync::Mutex;

use memfs::VirtualFileSystem;
use wasihost::FetchError;
use wasihost::FsFetch;
use wasihost::HostBuilder;
use wasihost::HostError;
use wasihost::ImportId;
use wasihost::InstantiateError;
use wasihost::RunError;
use wasihost::Runtime;
use wasmtime::Val;
use wasmtime::ValType;

/// Collects sink chunks.
fn collector() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str) + Send + 'static) {
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let chunks = Arc::clone(&chunks);
        move |text: &str| chunks.lock().unwrap().push(text.to_string())
    };
    (chunks, sink)
}

fn exit_guest(code: i32) -> String {
    format!(
        r#"(module
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start") (call $exit (i32.const {code}))))"#
    )
}

/// Reads `input.txt`, upper-cases ASCII letters, writes `/output.txt`.
/// Any failing syscall exits with its errno.
const UPCASE: &str = r#"(module
  (import "wasi_snapshot_preview1" "path_open" (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_close" (func $fd_close (param i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 1024) "input.txt")
  (data (i32.const 1040) "/output.txt")
  (func $check (param $errno i32)
    (if (local.get $errno) (then (call $exit (local.get $errno)))))
  (func (export "_start")
    (local $in i32) (local $n i32) (local $i i32) (local $c i32)
    (call $check (call $path_open (i32.const 3) (i32.const 0) (i32.const 1024) (i32.const 9)
      (i32.const 0) (i64.const 2) (i64.const 0) (i32.const 0) (i32.const 2000)))
    (local.set $in (i32.load (i32.const 2000)))
    (i32.store (i32.const 2008) (i32.const 4096))
    (i32.store (i32.const 2012) (i32.const 1024))
    (call $check (call $fd_read (local.get $in) (i32.const 2008) (i32.const 1) (i32.const 2004)))
    (local.set $n (i32.load (i32.const 2004)))
    (block $done
      (loop $upper
        (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
        (local.set $c (i32.load8_u (i32.add (i32.const 4096) (local.get $i))))
        (if (i32.and (i32.ge_u (local.get $c) (i32.const 97)) (i32.le_u (local.get $c) (i32.const 122)))
          (then (i32.store8 (i32.add (i32.const 4096) (local.get $i)) (i32.sub (local.get $c) (i32.const 32)))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $upper)))
    (call $check (call $fd_close (local.get $in)))
    (call $check (call $path_open (i32.const 3) (i32.const 0) (i32.const 1040) (i32.const 11)
      (i32.const 9) (i64.const 64) (i64.const 0) (i32.const 0) (i32.const 2000)))
    (i32.store (i32.const 2012) (local.get $n))
    (call $check (call $fd_write (i32.load (i32.const 2000)) (i32.const 2008) (i32.const 1) (i32.const 2004)))
    (call $exit (i32.const 0))))"#;

/// Creates `/f`, seeks to `i64::MAX` and writes one byte; exits with the
/// `fd_write` errno.
const SEEK_FAR_WRITE: &str = r#"(module
  (import "wasi_snapshot_preview1" "path_open" (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_seek" (func $fd_seek (param i32 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 1024) "/f")
  (data (i32.const 1100) "x")
  (func $check (param $errno i32)
    (if (local.get $errno) (then (call $exit (i32.add (i32.const 1000) (local.get $errno))))))
  (func (export "_start")
    (local $fd i32)
    (call $check (call $path_open (i32.const 3) (i32.const 0) (i32.const 1024) (i32.const 2)
      (i32.const 1) (i64.const 66) (i64.const 0) (i32.const 0) (i32.const 2000)))
    (local.set $fd (i32.load (i32.const 2000)))
    (call $check (call $fd_seek (local.get $fd) (i64.const 0x7fffffffffffffff) (i32.const 0) (i32.const 2008)))
    (i32.store (i32.const 2016) (i32.const 1100))
    (i32.store (i32.const 2020) (i32.const 1))
    (call $exit (call $fd_write (local.get $fd) (i32.const 2016) (i32.const 1) (i32.const 2004)))))"#;

/// Opens `/f` and reads into an iovec that runs off the end of memory, then
/// exits with `errno * 100 + cursor`.
const FAULTING_READ: &str = r#"(module
  (import "wasi_snapshot_preview1" "path_open" (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_tell" (func $fd_tell (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 1024) "/f")
  (func (export "_start")
    (local $fd i32) (local $errno i32)
    (drop (call $path_open (i32.const 3) (i32.const 0) (i32.const 1024) (i32.const 2)
      (i32.const 0) (i64.const 2) (i64.const 0) (i32.const 0) (i32.const 2000)))
    (local.set $fd (i32.load (i32.const 2000)))
    (i32.store (i32.const 2008) (i32.const 0xfffffff0))
    (i32.store (i32.const 2012) (i32.const 4))
    (local.set $errno (call $fd_read (local.get $fd) (i32.const 2008) (i32.const 1) (i32.const 2004)))
    (drop (call $fd_tell (local.get $fd) (i32.const 2016)))
    (call $exit (i32.add (i32.mul (local.get $errno) (i32.const 100)) (i32.load (i32.const 2016))))))"#;

/// Writes "line one\nline two\npartial" to stdout in three uneven chunks, then returns.
const CHUNKED_STDOUT: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 100) "line one\nline two\npartial")
  (func $write (param $ptr i32) (param $len i32)
    (i32.store (i32.const 0) (local.get $ptr))
    (i32.store (i32.const 4) (local.get $len))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8))))
  (func (export "_start")
    (call $write (i32.const 100) (i32.const 2))
    (call $write (i32.const 102) (i32.const 11))
    (call $write (i32.const 113) (i32.const 12))))"#;

/// Writes to stderr, then traps.
const FAILING: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 100) "about to fail\n")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 100))
    (i32.store (i32.const 4) (i32.const 14))
    (drop (call $fd_write (i32.const 2) (i32.const 0) (i32.const 1) (i32.const 8)))
    unreachable))"#;

/// Prints argv then the environment, one entry per line.
const ARGS_ENV: &str = r#"(module
  (import "wasi_snapshot_preview1" "args_sizes_get" (func $args_sizes (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "args_get" (func $args_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "environ_sizes_get" (func $env_sizes (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "environ_get" (func $env_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func $emit (param $buf i32) (param $len i32)
    (local $i i32)
    (block $done
      (loop $nul
        (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
        (if (i32.eqz (i32.load8_u (i32.add (local.get $buf) (local.get $i))))
          (then (i32.store8 (i32.add (local.get $buf) (local.get $i)) (i32.const 10))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $nul)))
    (i32.store (i32.const 8) (local.get $buf))
    (i32.store (i32.const 12) (local.get $len))
    (drop (call $fd_write (i32.const 1) (i32.const 8) (i32.const 1) (i32.const 16))))
  (func (export "_start")
    (drop (call $args_sizes (i32.const 0) (i32.const 4)))
    (if (i32.ne (i32.load (i32.const 0)) (i32.const 3)) (then unreachable))
    (drop (call $args_get (i32.const 1024) (i32.const 2048)))
    (if (i32.ne (i32.load (i32.const 1024)) (i32.const 2048)) (then unreachable))
    (call $emit (i32.const 2048) (i32.load (i32.const 4)))
    (drop (call $env_sizes (i32.const 0) (i32.const 4)))
    (drop (call $env_get (i32.const 1024) (i32.const 3072)))
    (call $emit (i32.const 3072) (i32.load (i32.const 4)))))"#;

/// Exercises random, clocks and sched_yield; exits with a code naming the
/// first check that failed, or 0.
const SYSTEM: &str = r#"(module
  (import "wasi_snapshot_preview1" "random_get" (func $random (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "clock_time_get" (func $time (param i32 i64 i32) (result i32)))
  (import "wasi_snapshot_preview1" "clock_res_get" (func $res (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "sched_yield" (func $yield (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (func $expect (param $ok i32) (param $code i32)
    (if (i32.eqz (local.get $ok)) (then (call $exit (local.get $code)))))
  (func (export "_start")
    (call $expect (i32.eqz (call $random (i32.const 64) (i32.const 32))) (i32.const 10))
    (call $expect (i32.eqz (call $time (i32.const 0) (i64.const 0) (i32.const 128))) (i32.const 11))
    (call $expect (i64.gt_u (i64.load (i32.const 128)) (i64.const 1600000000000000000)) (i32.const 12))
    (call $expect (i32.eqz (call $time (i32.const 1) (i64.const 0) (i32.const 136))) (i32.const 13))
    (call $expect (i32.eq (call $time (i32.const 9) (i64.const 0) (i32.const 136)) (i32.const 28)) (i32.const 14))
    (call $expect (i32.eqz (call $res (i32.const 1) (i32.const 144))) (i32.const 15))
    (call $expect (i64.eq (i64.load (i32.const 144)) (i64.const 1000)) (i32.const 16))
    (call $expect (i32.eqz (call $yield)) (i32.const 17))
    (call $expect (i32.eq (call $random (i32.const 65535) (i32.const 2)) (i32.const 21)) (i32.const 18))
    (call $exit (i32.const 0))))"#;

/// Prints the preopen's name and exits with fd_prestat_get(4)'s errno.
const PREOPEN: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_prestat_get" (func $prestat (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_prestat_dir_name" (func $dir_name (param i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (if (call $prestat (i32.const 3) (i32.const 32)) (then unreachable))
    (if (call $dir_name (i32.const 3) (i32.const 100) (i32.load (i32.const 36))) (then unreachable))
    (i32.store (i32.const 0) (i32.const 100))
    (i32.store (i32.const 4) (i32.load (i32.const 36)))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
    (call $exit (call $prestat (i32.const 4) (i32.const 32)))))"#;

/// Declares an import no provider supplies and calls it only when asked to.
fn unknown_import_guest(call_it: bool) -> String {
    let body = if call_it {
        "(drop (call $poll (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0)))"
    } else {
        ""
    };
    format!(
        r#"(module
  (import "wasi_snapshot_preview1" "poll_oneoff" (func $poll (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "_start") {body}))"#
    )
}

// --- Exit status ---

#[tokio::test]
async fn test_exit_codes() {
    let rt = Runtime::new().expect("Failed to create runtime");
    for code in [0, 1, 2, 127] {
        let host = HostBuilder::new().build().expect("Failed to build host");
        let instance = rt
            .instantiate_bytes(exit_guest(code), host)
            .await
            .expect("Failed to instantiate");
        let status = instance.start().await.expect("Run failed");
        assert_eq!(status.code, code);
        assert_eq!(status.success(), code == 0);
    }
}

#[tokio::test]
async fn test_normal_return_is_exit_zero() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let host = HostBuilder::new().build().expect("Failed to build host");
    let instance = rt
        .instantiate_bytes(r#"(module (func (export "_start")))"#, host)
        .await
        .expect("Failed to instantiate");
    assert_eq!(instance.start().await.expect("Run failed").code, 0);
}

#[tokio::test]
async fn test_trap_carries_stderr() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let (chunks, sink) = collector();
    let host = HostBuilder::new().stderr(sink).build().expect("Failed to build host");
    let instance = rt.instantiate_bytes(FAILING, host).await.expect("Failed to instantiate");

    match instance.start().await {
        Err(err @ RunError::Trap { .. }) => {
            assert_eq!(err.stderr(), "about to fail\n");
            assert!(err.asyncify().is_none());
            assert!(err.to_string().contains("about to fail"));
        }
        other => panic!("Expected a trap, got {:?}", other),
    }
    assert_eq!(*chunks.lock().unwrap(), vec!["about to fail\n"]);
}

#[tokio::test]
async fn test_missing_entry() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let host = HostBuilder::new().entry("main").build().expect("Failed to build host");
    let instance = rt.instantiate_bytes(exit_guest(0), host).await.expect("Failed to instantiate");
    assert_eq!(instance.entry(), "main");

    match instance.start().await {
        Err(RunError::MissingExport(name)) => assert_eq!(name, "main"),
        other => panic!("Expected a missing export, got {:?}", other),
    }
}

// --- Filesystem and stdio ---

#[tokio::test]
async fn test_upcase_round_trip() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let fs = VirtualFileSystem::new();
    fs.add_file("/input.txt", b"hello".to_vec()).expect("Failed to add input");

    let host = HostBuilder::new()
        .args(["upcase"])
        .fs(fs.clone())
        .build()
        .expect("Failed to build host");
    let instance = rt.instantiate_bytes(UPCASE, host).await.expect("Failed to instantiate");
    assert!(!instance.is_instrumented());

    let status = instance.start().await.expect("Run failed");
    assert_eq!(status.code, 0);
    assert_eq!(fs.read_file("/output.txt").expect("No output file"), b"HELLO");
}

#[tokio::test]
async fn test_missing_input_exits_with_noent() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let fs = VirtualFileSystem::new();
    let host = HostBuilder::new().fs(fs.clone()).build().expect("Failed to build host");
    let instance = rt.instantiate_bytes(UPCASE, host).await.expect("Failed to instantiate");

    assert_eq!(instance.start().await.expect("Run failed").code, 44);
    assert!(fs.lookup("/output.txt").is_none());
}

#[tokio::test]
async fn test_write_past_size_limit_is_fbig() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let fs = VirtualFileSystem::new();
    let host = HostBuilder::new().fs(fs.clone()).build().expect("Failed to build host");
    let instance = rt.instantiate_bytes(SEEK_FAR_WRITE, host).await.expect("Failed to instantiate");

    let status = tokio::spawn(instance.start())
        .await
        .expect("Host panicked")
        .expect("Run failed");
    assert_eq!(status.code, 22);
    assert_eq!(fs.read_file("/f").expect("No file"), b"");
}

#[tokio::test]
async fn test_faulting_read_keeps_cursor() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let fs = VirtualFileSystem::new();
    fs.add_file("/f", b"hello".to_vec()).expect("Failed to add file");
    let host = HostBuilder::new().fs(fs).build().expect("Failed to build host");
    let instance = rt.instantiate_bytes(FAULTING_READ, host).await.expect("Failed to instantiate");

    // Fault (21), cursor still at 0.
    assert_eq!(instance.start().await.expect("Run failed").code, 2100);
}

#[tokio::test]
async fn test_stdout_one_line_per_chunk() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let (chunks, sink) = collector();
    let host = HostBuilder::new().stdout(sink).build().expect("Failed to build host");
    let instance = rt.instantiate_bytes(CHUNKED_STDOUT, host).await.expect("Failed to instantiate");

    assert_eq!(instance.start().await.expect("Run failed").code, 0);
    let chunks = chunks.lock().unwrap();
    assert_eq!(*chunks, vec!["line one\n", "line two\n", "partial"]);
    assert_eq!(chunks.concat(), "line one\nline two\npartial");
}

#[tokio::test]
async fn test_preopen_is_advertised() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let (chunks, sink) = collector();
    let host = HostBuilder::new().stdout(sink).build().expect("Failed to build host");
    let instance = rt.instantiate_bytes(PREOPEN, host).await.expect("Failed to instantiate");

    // Badf ends the guest's preopen scan.
    assert_eq!(instance.start().await.expect("Run failed").code, 8);
    assert_eq!(chunks.lock().unwrap().concat(), "/");
}

#[tokio::test]
async fn test_hosts_do_not_share_files() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let first = VirtualFileSystem::from_files([("/input.txt", b"abc".to_vec())]).unwrap();
    let second = VirtualFileSystem::from_files([("/input.txt", b"xyz".to_vec())]).unwrap();

    let a = rt
        .instantiate_bytes(UPCASE, HostBuilder::new().fs(first.clone()).build().unwrap())
        .await
        .expect("Failed to instantiate");
    let b = rt
        .instantiate_bytes(UPCASE, HostBuilder::new().fs(second.clone()).build().unwrap())
        .await
        .expect("Failed to instantiate");

    let (ra, rb) = tokio::join!(a.start(), b.start());
    assert_eq!(ra.expect("First run failed").code, 0);
    assert_eq!(rb.expect("Second run failed").code, 0);
    assert_eq!(first.read_file("/output.txt").unwrap(), b"ABC");
    assert_eq!(second.read_file("/output.txt").unwrap(), b"XYZ");
}

// --- Process environment ---

#[tokio::test]
async fn test_args_and_env() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let (chunks, sink) = collector();
    let host = HostBuilder::new()
        .args(["prog", "foo"])
        .arg("bar")
        .env("B", "2")
        .envs([("A", "1")])
        .stdout(sink)
        .build()
        .expect("Failed to build host");
    let instance = rt.instantiate_bytes(ARGS_ENV, host).await.expect("Failed to instantiate");

    assert_eq!(instance.start().await.expect("Run failed").code, 0);
    assert_eq!(
        *chunks.lock().unwrap(),
        vec!["prog\n", "foo\n", "bar\n", "A=1\n", "B=2\n"]
    );
}

#[tokio::test]
async fn test_random_clock_and_yield() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let host = HostBuilder::new().build().expect("Failed to build host");
    let instance = rt.instantiate_bytes(SYSTEM, host).await.expect("Failed to instantiate");
    assert_eq!(instance.start().await.expect("Run failed").code, 0);
}

// --- Imports ---

#[tokio::test]
async fn test_unknown_import_traps_only_when_called() {
    let rt = Runtime::new().expect("Failed to create runtime");

    let quiet = rt
        .instantiate_bytes(unknown_import_guest(false), HostBuilder::new().build().unwrap())
        .await
        .expect("Unknown imports should link as traps");
    assert_eq!(quiet.start().await.expect("Run failed").code, 0);

    let loud = rt
        .instantiate_bytes(unknown_import_guest(true), HostBuilder::new().build().unwrap())
        .await
        .expect("Unknown imports should link as traps");
    assert!(matches!(loud.start().await, Err(RunError::Trap { .. })));
}

#[tokio::test]
async fn test_unknown_import_fails_link_when_strict() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let host = HostBuilder::new().trap_unknown_imports(false).build().unwrap();

    match rt.instantiate_bytes(unknown_import_guest(false), host).await {
        Err(InstantiateError::Link(msg)) => assert!(msg.contains("poll_oneoff"), "{}", msg),
        Err(other) => panic!("Expected a link error, got {}", other),
        Ok(_) => panic!("Expected a link error"),
    }
}

#[test]
fn test_duplicate_import_is_rejected() {
    let result = HostBuilder::new()
        .import(
            "wasi_snapshot_preview1",
            "fd_write",
            &[ValType::I32, ValType::I32, ValType::I32, ValType::I32],
            &[ValType::I32],
            |_| Ok(vec![Val::I32(0)]),
        )
        .build();

    match result {
        Err(HostError::DuplicateImport { import, first, second }) => {
            assert_eq!(import, ImportId::new("wasi_snapshot_preview1", "fd_write"));
            assert_eq!(first, "fs");
            assert_eq!(second, "custom");
        }
        Err(other) => panic!("Expected a duplicate import, got {}", other),
        Ok(_) => panic!("Expected a duplicate import"),
    }
}

#[test]
fn test_non_numeric_import_is_rejected() {
    let result = HostBuilder::new()
        .import("env", "handle", &[ValType::EXTERNREF], &[], |_| Ok(vec![]))
        .build();
    assert!(matches!(result, Err(HostError::UnsupportedType { .. })));
}

#[tokio::test]
async fn test_sync_custom_import_without_asyncify() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let host = HostBuilder::new()
        .import("env", "double", &[ValType::I32], &[ValType::I32], |args| {
            Ok(vec![Val::I32(args[0].unwrap_i32() * 2)])
        })
        .build()
        .expect("Failed to build host");
    let guest = r#"(module
  (import "env" "double" (func $double (param i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start") (call $exit (call $double (i32.const 21)))))"#;
    let instance = rt.instantiate_bytes(guest, host).await.expect("Failed to instantiate");
    assert_eq!(instance.start().await.expect("Run failed").code, 42);
}

// --- Fetch ---

#[tokio::test]
async fn test_fetch_missing_module() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let host = HostBuilder::new().build().unwrap();
    let result = rt
        .instantiate_streaming(&FsFetch::new(), "/definitely/not/here.wasm", host)
        .await;
    assert!(matches!(result, Err(InstantiateError::Fetch(FetchError::NotFound(_)))));
}

#[tokio::test]
async fn test_fetch_from_disk() {
    let dir = std::env::temp_dir().join(format!("wasihost-fetch-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.expect("Failed to create temp dir");
    tokio::fs::write(dir.join("exit3.wat"), exit_guest(3)).await.expect("Failed to write module");

    let rt = Runtime::new().expect("Failed to create runtime");
    let host = HostBuilder::new().build().unwrap();
    let instance = rt
        .instantiate_streaming(&FsFetch::with_base(&dir), "exit3.wat", host)
        .await
        .expect("Failed to instantiate");
    assert_eq!(instance.start().await.expect("Run failed").code, 3);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_compile_error() {
    let rt = Runtime::new().expect("Failed to create runtime");
    let host = HostBuilder::new().build().unwrap();
    let result = rt.instantiate_bytes("(module (func", host).await;
    assert!(matches!(result, Err(InstantiateError::Compile(_))));
}

//! Boot-to-idle smoke test (spec.md §6: "Smoke-test harness (out-of-scope
//! collaborator)"). Spawns QEMU against an already-built kernel image and
//! watches the serial console for `[BOOT:OK]` or a `[PANIC]` line, the same
//! two markers `bootstrap`/the panic handler emit.
//!
//! Out of scope per spec.md means "not part of the kernel's own design" —
//! the kernel doesn't know this harness exists — not "untested". This runs
//! as a normal `cargo test` binary (`harness = false`, its own `main`)
//! against whichever architecture's image `BULLFINCH_SMOKE_KERNEL` points
//! at; with that variable unset (the common case on a developer machine
//! without a cross toolchain and QEMU installed) it skips instead of
//! failing, matching the "out-of-scope collaborator" framing.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const BOOT_OK: &str = "[BOOT:OK]";
const PANIC_MARKER: &str = "[PANIC]";
const TIMEOUT: Duration = Duration::from_secs(20);

fn qemu_args(kernel: &str, arch: &str) -> (&'static str, Vec<String>) {
    match arch {
        "aarch64" => (
            "qemu-system-aarch64",
            vec![
                "-M".into(), "virt".into(),
                "-cpu".into(), "cortex-a53".into(),
                "-m".into(), "2048".into(),
                "-nographic".into(),
                "-serial".into(), "stdio".into(),
                "-kernel".into(), kernel.into(),
            ],
        ),
        "riscv64" => (
            "qemu-system-riscv64",
            vec![
                "-M".into(), "virt".into(),
                "-m".into(), "2048".into(),
                "-nographic".into(),
                "-serial".into(), "stdio".into(),
                "-bios".into(), "default".into(),
                "-kernel".into(), kernel.into(),
            ],
        ),
        other => panic!("unknown smoke-test architecture {other:?}"),
    }
}

fn main() {
    let kernel = match std::env::var("BULLFINCH_SMOKE_KERNEL") {
        Ok(path) => path,
        Err(_) => {
            println!("BULLFINCH_SMOKE_KERNEL not set, skipping boot smoke test");
            return;
        }
    };
    let arch = std::env::var("BULLFINCH_SMOKE_ARCH").unwrap_or_else(|_| "aarch64".into());

    let (qemu_bin, args) = qemu_args(&kernel, &arch);

    let mut child = Command::new(qemu_bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap_or_else(|e| panic!("failed to launch {qemu_bin}: {e}"));

    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut seen = String::new();
    let mut buf = [0u8; 256];
    let start = Instant::now();
    let mut outcome = None;

    while start.elapsed() < TIMEOUT {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                seen.push_str(&String::from_utf8_lossy(&buf[..n]));
                if seen.contains(BOOT_OK) {
                    outcome = Some(true);
                    break;
                }
                if seen.contains(PANIC_MARKER) {
                    outcome = Some(false);
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let _ = child.kill();
    let _ = child.wait();

    match outcome {
        Some(true) => println!("boot smoke test passed:\n{seen}"),
        Some(false) => panic!("kernel panicked during boot:\n{seen}"),
        None => panic!("timed out after {TIMEOUT:?} waiting for {BOOT_OK:?}:\n{seen}"),
    }
}

//! End-to-end "clean run" (spec.md §8 scenario 1): two real `risu`
//! processes, one master and one apprentice, driven over a loopback TCP
//! port against a tiny hand-assembled x86_64 checkpoint image.
//!
//! The image performs SETMEMBLOCK, COMPARE, COMPAREMEM, TESTEND in
//! sequence, using the same checkpoint encoding
//! `risu_reginfo::arch::x86_64` decodes (`0f 0b` + a key byte whose high
//! nibble is `RISU_KEY` and low nibble is the op).

use assert_cmd::cargo::CommandCargoExt;
use std::process::Command;
use std::time::Duration;

const MEMBLOCKLEN: usize = 4096;
const RISU_KEY: u8 = 0x50;
const OP_COMPARE: u8 = 0;
const OP_SETMEMBLOCK: u8 = 2;
const OP_COMPAREMEM: u8 = 4;
const OP_TESTEND: u8 = 1;

fn build_image() -> Vec<u8> {
    let mut code = Vec::new();

    // lea rdi, [rip + rel32] -> points rdi at the scratch page that
    // starts at file offset MEMBLOCKLEN.
    let lea_next = code.len() + 7;
    let rel = (MEMBLOCKLEN as i64) - (lea_next as i64);
    code.extend_from_slice(&[0x48, 0x8D, 0x3D]);
    code.extend_from_slice(&(rel as i32).to_le_bytes());

    code.extend_from_slice(&[0x0F, 0x0B, RISU_KEY | OP_SETMEMBLOCK]); // SETMEMBLOCK
    code.extend_from_slice(&[0xB8, 0x44, 0x33, 0x22, 0x11]); // mov eax, 0x11223344
    code.extend_from_slice(&[0x0F, 0x0B, RISU_KEY | OP_COMPARE]); // COMPARE
    code.extend_from_slice(&[0x0F, 0x0B, RISU_KEY | OP_COMPAREMEM]); // COMPAREMEM
    code.extend_from_slice(&[0x0F, 0x0B, RISU_KEY | OP_TESTEND]); // TESTEND
    code.push(0xCC); // int3 safety net; unreachable if TESTEND ends the run

    assert!(code.len() < MEMBLOCKLEN, "checkpoint code overflows the header page");

    let mut image = vec![0u8; MEMBLOCKLEN + MEMBLOCKLEN];
    image[..code.len()].copy_from_slice(&code);
    image
}

#[test]
#[cfg(target_arch = "x86_64")]
fn clean_run_matches_between_two_risu_processes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image_path = dir.path().join("checkpoint.img");
    std::fs::write(&image_path, build_image()).expect("write image");

    let port = 19191u16;

    let mut master = Command::cargo_bin("risu")
        .expect("locate risu binary")
        .args(["--master", "--port", &port.to_string()])
        .arg(&image_path)
        .spawn()
        .expect("spawn master");

    std::thread::sleep(Duration::from_millis(200));

    let mut apprentice = Command::cargo_bin("risu")
        .expect("locate risu binary")
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .arg(&image_path)
        .spawn()
        .expect("spawn apprentice");

    let master_status = master.wait().expect("wait on master");
    let apprentice_status = apprentice.wait().expect("wait on apprentice");

    assert!(master_status.success(), "master exited with {master_status}");
    assert!(apprentice_status.success(), "apprentice exited with {apprentice_status}");
}

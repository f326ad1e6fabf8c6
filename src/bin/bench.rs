//! VM micro-benchmark binary.
//!
//! Measures interpreter throughput on representative filters.
//! Run with: `cargo run --release --bin bench`

use bpfvm::assembler::parse_hex;
use bpfvm::util::hex::parse_hex as packet_hex;
use bpfvm::vm::BpfVm;
use std::time::{Duration, Instant};

/// `tcp and dst port 80` with a source-address match, 15 instructions.
const TCP_FILTER: &str = "\
{ 0x28, 0, 0, 0x0000000c },
{ 0x15, 0, 12, 0x00000800 },
{ 0x20, 0, 0, 0x0000001a },
{ 0x15, 0, 10, 0xc0a80101 },
{ 0x30, 0, 0, 0x00000017 },
{ 0x15, 2, 0, 0x00000084 },
{ 0x15, 1, 0, 0x00000006 },
{ 0x15, 0, 6, 0x00000011 },
{ 0x28, 0, 0, 0x00000014 },
{ 0x45, 4, 0, 0x00001fff },
{ 0xb1, 0, 0, 0x0000000e },
{ 0x48, 0, 0, 0x00000010 },
{ 0x15, 0, 1, 0x00000050 },
{ 0x6, 0, 0, 0x00040000 },
{ 0x6, 0, 0, 0x00000000 },
";

const ACCEPT_ALL: &str = "{ 0x06, 0, 0, 0x00040000 },";

struct BenchResult {
    name: &'static str,
    iterations: u64,
    total: Duration,
}

impl BenchResult {
    fn print(&self) {
        let ns_per_op = self.total.as_nanos() as f64 / self.iterations as f64;
        println!(
            "  {:<30} {:>9} iters {:>10.1} ns/op",
            self.name, self.iterations, ns_per_op
        );
    }
}

/// Runs `f` for at least `min_duration`, returning aggregated results.
fn bench<F>(name: &'static str, min_duration: Duration, mut f: F) -> BenchResult
where
    F: FnMut() -> u32,
{
    // Warmup
    for _ in 0..100 {
        f();
    }

    let start = Instant::now();
    let mut iterations = 0_u64;
    let mut sink = 0_u32;
    while start.elapsed() < min_duration {
        for _ in 0..1000 {
            sink = sink.wrapping_add(f());
            iterations += 1;
        }
    }
    std::hint::black_box(sink);

    BenchResult {
        name,
        iterations,
        total: start.elapsed(),
    }
}

fn syn_packet() -> Vec<u8> {
    let mut packet = packet_hex(
        "ff ff ff ff ff ff 00 11 22 33 44 55 08 00 \
         45 00 00 28 00 01 40 00 40 06 00 00 c0 a8 01 01 0a 00 00 01",
    )
    .expect("bad packet hex");
    packet
        .extend(packet_hex("04 d2 00 50 00 00 00 01 00 00 00 00 50 02 20 00 00 00 00 00").unwrap());
    packet
}

fn main() {
    let min_duration = Duration::from_millis(500);
    let packet = syn_packet();

    println!("bpfvm interpreter benchmarks");

    let mut vm = BpfVm::new();
    vm.load_program(parse_hex(ACCEPT_ALL).expect("parse")).expect("load");
    bench("accept-all (1 insn)", min_duration, || {
        vm.execute(&packet).expect("execute")
    })
    .print();

    let mut vm = BpfVm::new();
    vm.load_program(parse_hex(TCP_FILTER).expect("parse")).expect("load");
    bench("tcp dst port 80 (15 insns)", min_duration, || {
        vm.execute(&packet).expect("execute")
    })
    .print();

    let mut vm = BpfVm::new();
    vm.load_program(parse_hex(TCP_FILTER).expect("parse")).expect("load");
    let miss = {
        let mut p = packet.clone();
        p[13] = 0xDD; // wrong ethertype: earliest possible reject
        p
    };
    bench("tcp filter, early reject", min_duration, || {
        vm.execute(&miss).expect("execute")
    })
    .print();
}

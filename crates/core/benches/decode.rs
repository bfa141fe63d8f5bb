use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu86_core::bus::Bus;
use emu86_core::cpu::Cpu;
use emu86_core::decoder::decode;
use emu86_core::stream::ByteStream;

/// Mixed instruction stream covering the common operand forms
const PROGRAM: &[u8] = &[
    0xB8, 0x34, 0x12, // mov ax, 0x1234
    0x8B, 0x46, 0xFE, // mov ax, [bp-2]
    0x01, 0xD8, // add ax, bx
    0x83, 0xC3, 0xFF, // add bx, -1
    0x26, 0x89, 0x47, 0x10, // mov es:[bx+0x10], ax
    0xC7, 0x06, 0x00, 0x20, 0x34, 0x12, // mov word [0x2000], 0x1234
    0xF3, 0xA4, // rep movsb
    0xD1, 0xE0, // shl ax, 1
    0x50, // push ax
    0x58, // pop ax
    0xE2, 0xFE, // loop $
];

/// Endless loop used for the step benchmarks
const LOOP: &[u8] = &[
    0x40, // inc ax
    0x01, 0xC3, // add bx, ax
    0x31, 0xD9, // xor cx, bx
    0x89, 0x1E, 0x00, 0x20, // mov [0x2000], bx
    0x8B, 0x16, 0x00, 0x20, // mov dx, [0x2000]
    0x50, // push ax
    0x58, // pop ax
    0xEB, 0xEF, // jmp short to the top
];

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    group.bench_function("mixed_stream", |b| {
        b.iter(|| {
            let mut stream = ByteStream::new(PROGRAM);
            let mut count = 0;
            while (stream.position() as usize) < PROGRAM.len() {
                if decode(&mut stream).is_err() {
                    break;
                }
                count += 1;
            }
            black_box(count);
        });
    });

    group.finish();
}

fn loop_cpu() -> Cpu {
    let mut bus = Bus::default();
    bus.load(0x0100, LOOP);
    let mut cpu = Cpu::new(bus);
    cpu.regs.cs = 0;
    cpu.regs.ip = 0x0100;
    cpu.regs.sp = 0xFFFE;
    cpu
}

fn bench_cpu_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_steps");

    for step_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            step_count,
            |b, &count| {
                let mut cpu = loop_cpu();
                b.iter(|| {
                    for _ in 0..count {
                        let _ = cpu.step();
                    }
                    black_box(cpu.regs.ax);
                });
            },
        );
    }

    group.finish();
}

fn bench_cpu_reset(c: &mut Criterion) {
    c.bench_function("cpu_8086_reset", |b| {
        let mut cpu = loop_cpu();
        b.iter(|| {
            cpu.reset();
            black_box(cpu.regs.cs);
        });
    });
}

criterion_group!(benches, bench_decode, bench_cpu_steps, bench_cpu_reset);
criterion_main!(benches);

//! Publish one payload to several subscribers without copying it.
//!
//! Run with: `cargo run -p msgframe --example fan-out`

use msgframe::frame::{Frame, FrameFlags};
use msgframe::pool::BufferPool;

const SUBSCRIBERS: usize = 3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pool = BufferPool::new();

    let mut header = Frame::from_slice(&pool, b"ticker.eur");
    header.set_flags(FrameFlags::MORE);
    let mut body = Frame::from_slice(&pool, b"1.0842");

    body.add_references(SUBSCRIBERS);
    let mut deliveries = Vec::with_capacity(SUBSCRIBERS);
    for _ in 0..SUBSCRIBERS {
        let mut topic = Frame::new();
        topic.copy_from(&mut header)?;
        deliveries.push((topic, body.claim_reference()?));
    }
    // The publisher's own hold on the body is no longer needed.
    body.close()?;

    for (i, (topic, payload)) in deliveries.iter_mut().enumerate() {
        println!(
            "subscriber {i}: {} = {} ({payload})",
            String::from_utf8_lossy(&topic.to_vec()?),
            String::from_utf8_lossy(&payload.to_vec()?),
        );
        topic.close()?;
        payload.close()?;
    }
    header.close()?;

    let stats = pool.stats();
    println!(
        "pool: takes={} gives={} idle={}",
        stats.takes, stats.gives, stats.idle_buffers
    );
    Ok(())
}

/*!
`neuroshare-rs` is a pure Rust reader for the family of binary recording files produced by
multichannel electrode acquisition systems. A single logical recording comprises one event/spike
file (`.nev`, digital events and spike waveforms) and zero or more companion continuous-sampling
files (`.ns1`..`.ns9`, periodically sampled analog channels, possibly at different rates).

Given a path to the event file, [`session::RecordingSession`] discovers its siblings, parses the
three binary formats, cross-indexes their contents, and exposes every channel and event source as
an addressable [`entity::Entity`] supporting random-access reads by index or by time.

This crate is read-only: it does not write or mutate these files, and it does not stream from
non-seekable inputs. A session, its file handles, and its entities are single-threaded; any
concurrent use must be layered above by the embedding application.

# Example

```no_run
use neuroshare_rs::entity::TimeSearchMode;
use neuroshare_rs::session::RecordingSession;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let session = RecordingSession::open("recording.nev")?;
    println!("file_type: {}", session.file_type);

    for (index, entity) in session.entities().iter().enumerate() {
        println!("entity {}: {} items", index, entity.item_count());
    }

    if let Some(entity) = session.entities().first() {
        let first_time = entity.get_time_by_index(0)?;
        let round_trip = entity.get_index_by_time(first_time, TimeSearchMode::At)?;
        assert_eq!(round_trip, 0);
    }

    Ok(())
}
```
*/

pub mod decode;
pub mod entity;
pub mod error;
pub mod headers;
pub mod parsers;
pub mod session;

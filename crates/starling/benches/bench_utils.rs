//! Benchmark utilities for generating song catalog and play event data.

use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use rand::seq::SliceRandom;

use starling::source::{Dataset, FileReader, JsonReader, infer_file_schema};

const LEVELS: [&str; 2] = ["free", "paid"];
const PAGES: [&str; 4] = ["NextSong", "NextSong", "NextSong", "Home"];

/// Newline-delimited catalog records, one song per artist.
pub fn generate_song_lines(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();

    (0..count)
        .map(|i| {
            let year = if rng.gen_bool(0.8) { rng.gen_range(1960..2019) } else { 0 };
            let duration: f64 = rng.gen_range(60.0..600.0);
            format!(
                r#"{{"num_songs":1,"artist_id":"AR{i:06}","artist_latitude":null,"artist_longitude":null,"artist_location":"","artist_name":"Artist {i}","song_id":"SO{i:06}","title":"Song {i}","duration":{duration:.5},"year":{year}}}"#
            )
        })
        .collect()
}

/// Newline-delimited play events against a catalog of `catalog_size` songs.
///
/// About a quarter of the events are page views, and a tenth of the plays
/// name a song that is not in the catalog.
pub fn generate_event_lines(count: usize, catalog_size: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();

    (0..count)
        .map(|i| {
            let page = PAGES.choose(&mut rng).copied().unwrap_or("NextSong");
            let song = if rng.gen_bool(0.9) {
                rng.gen_range(0..catalog_size)
            } else {
                catalog_size + i
            };
            let user = rng.gen_range(1..100);
            let level = LEVELS[rng.gen_range(0..2)];
            let ts: i64 = 1_541_000_000_000 + (i as i64) * 1_000;
            format!(
                r#"{{"artist":"Artist {song}","auth":"Logged In","firstName":"First{user}","gender":"F","itemInSession":{i},"lastName":"Last{user}","length":200.0,"level":"{level}","location":"NY","method":"PUT","page":"{page}","registration":1540919166796.0,"sessionId":{session},"song":"Song {song}","status":200,"ts":{ts},"userAgent":"UA","userId":"{user}"}}"#,
                session = i / 50,
            )
        })
        .collect()
}

/// Join lines into the bytes of one source file.
pub fn to_file(lines: &[String]) -> Bytes {
    Bytes::from(lines.join("\n"))
}

/// Decode generated files into a dataset, one partition per file.
pub fn dataset(name: &'static str, files: &[Bytes]) -> Dataset {
    let schema = Arc::new(infer_file_schema(&files[0], name).expect("Failed to infer schema"));
    let reader = JsonReader::new(schema.clone(), 8192);

    let partitions = files
        .iter()
        .flat_map(|data| {
            reader
                .read(data.clone(), name)
                .expect("Failed to decode file")
                .batches
        })
        .collect();

    Dataset {
        name,
        schema,
        partitions,
    }
}

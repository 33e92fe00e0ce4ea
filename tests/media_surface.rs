mod helpers;

use std::time::Duration;

use helpers::{Harness, track, track_id, tracks};
use tunestream::engine::{MediaCommand, MediaPlayback};

#[tokio::test(start_paused = true)]
async fn metadata_follows_the_loaded_duration() {
    let mut h = Harness::new();
    h.backend.set_duration("a", 123.0);
    h.engine.play_queue(vec![track("a", 100.0)], 0).await.unwrap();

    let state = h.wait_playing("a").await;
    assert_eq!(state.duration_seconds, 123.0);

    let log = h.media.log();
    let durations: Vec<f64> = log.metadata.iter().map(|m| m.duration_seconds).collect();
    assert_eq!(durations, vec![100.0, 123.0]);
    assert_eq!(log.metadata[0].title, "Title a");
    assert_eq!(log.playback.last(), Some(&MediaPlayback::Playing));
}

#[tokio::test(start_paused = true)]
async fn seek_while_paused_reaches_the_surface() {
    let mut h = Harness::new();
    h.engine.cue_queue(tracks(&["a"], 180.0), 0).await.unwrap();
    h.wait_for(|s| !s.is_loading && s.track.is_some()).await;

    h.engine.seek(42.0).await.unwrap();
    assert_eq!(h.current().position_seconds, 42.0);
    assert!(!h.current().is_playing);

    tokio::time::sleep(Duration::from_millis(300)).await;
    {
        let log = h.media.log();
        let last = log.positions.last().copied().unwrap();
        assert_eq!(last.position_seconds, 42.0);
        assert_eq!(last.duration_seconds, 180.0);
        assert_eq!(last.playback_rate, 0.0);
    }

    // Out of range targets clamp to the track
    h.engine.seek(1000.0).await.unwrap();
    assert_eq!(h.current().position_seconds, 180.0);
    h.engine.seek_by(-200.0).await.unwrap();
    assert_eq!(h.current().position_seconds, 0.0);
}

#[tokio::test(start_paused = true)]
async fn seek_before_ready_applies_once_loaded() {
    let mut h = Harness::new();
    h.fetcher.delay("a", Duration::from_secs(1));
    h.engine.cue_queue(tracks(&["a"], 180.0), 0).await.unwrap();

    h.engine.seek(30.0).await.unwrap();
    assert_eq!(h.current().position_seconds, 30.0);

    let state = h.wait_for(|s| !s.is_loading).await;
    assert_eq!(state.position_seconds, 30.0);
    h.engine.play().await.unwrap();
    let handle = h.backend.last_handle().unwrap();
    assert!(handle.lock().unwrap().is_playing());
}

#[tokio::test(start_paused = true)]
async fn position_updates_are_debounced() {
    let mut h = Harness::new();
    h.engine.cue_queue(tracks(&["a"], 180.0), 0).await.unwrap();
    h.wait_for(|s| !s.is_loading && s.track.is_some()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let before = h.media.log().positions.len();

    for target in [10.0, 20.0, 30.0, 40.0] {
        h.engine.seek(target).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    let log = h.media.log();
    let published: Vec<f64> = log.positions[before..].iter().map(|p| p.position_seconds).collect();
    assert_eq!(published, vec![10.0, 40.0]);
}

#[tokio::test(start_paused = true)]
async fn media_keys_drive_transport() {
    let mut h = Harness::new();
    let keys = h.engine.media_commands();
    h.engine.play_queue(tracks(&["a", "b"], 180.0), 0).await.unwrap();
    h.wait_playing("a").await;

    keys.send(MediaCommand::Pause).unwrap();
    h.wait_for(|s| !s.is_playing).await;
    assert_eq!(h.media.log().playback.last(), Some(&MediaPlayback::Paused));

    keys.send(MediaCommand::Toggle).unwrap();
    h.wait_playing("a").await;

    keys.send(MediaCommand::SeekTo(60.0)).unwrap();
    h.wait_for(|s| s.position_seconds >= 60.0).await;

    keys.send(MediaCommand::Stop).unwrap();
    let state = h.wait_for(|s| !s.is_playing && s.position_seconds == 0.0).await;
    assert_eq!(track_id(&state), Some("a"));
    assert_eq!(h.media.log().playback.last(), Some(&MediaPlayback::Stopped));

    keys.send(MediaCommand::Next).unwrap();
    h.wait_for(|s| track_id(s) == Some("b")).await;
}

#[tokio::test(start_paused = true)]
async fn skip_keys_are_ignored_while_a_transition_loads() {
    let mut h = Harness::new();
    h.fetcher.delay("b", Duration::from_secs(2));
    let keys = h.engine.media_commands();
    h.engine.play_queue(tracks(&["a", "b", "c"], 180.0), 0).await.unwrap();
    h.wait_playing("a").await;

    h.engine.next().await.unwrap();
    keys.send(MediaCommand::Next).unwrap();
    keys.send(MediaCommand::Previous).unwrap();

    h.wait_playing("b").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let state = h.current();
    assert_eq!(track_id(&state), Some("b"));
    assert_eq!(state.queue_index, Some(1));
    assert_eq!(h.fetcher.calls_for("c"), 0);

    // Once settled the same key goes through
    keys.send(MediaCommand::Next).unwrap();
    h.wait_playing("c").await;
}

#[tokio::test(start_paused = true)]
async fn device_volume_echo_is_ignored() {
    let mut h = Harness::new();
    let keys = h.engine.media_commands();
    h.engine.play_queue(tracks(&["a"], 180.0), 0).await.unwrap();
    h.wait_playing("a").await;
    let handle = h.backend.last_handle().unwrap();

    h.engine.set_volume(0.5).await.unwrap();
    assert_eq!(h.current().volume, 0.5);
    assert_eq!(handle.lock().unwrap().volume, 0.5);
    assert_eq!(h.media.log().volumes.last(), Some(&0.5));

    keys.send(MediaCommand::VolumeChanged(0.505)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.current().volume, 0.5);
    assert_eq!(handle.lock().unwrap().volume, 0.5);

    keys.send(MediaCommand::VolumeChanged(0.8)).unwrap();
    h.wait_for(|s| s.volume == 0.8).await;
    assert_eq!(handle.lock().unwrap().volume, 0.8);
    // Adopted device volume is not echoed back
    assert!(!h.media.log().volumes.contains(&0.8));

    h.engine.set_muted(true).await.unwrap();
    assert!(h.current().muted);
    assert_eq!(h.current().volume, 0.8);
    assert_eq!(handle.lock().unwrap().volume, 0.0);

    h.engine.set_volume(7.0).await.unwrap();
    assert_eq!(h.current().volume, 1.0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_clears_the_surface() {
    let mut h = Harness::new();
    h.engine.play_queue(tracks(&["a"], 180.0), 0).await.unwrap();
    h.wait_playing("a").await;

    h.engine.shutdown().await.unwrap();
    assert_eq!(h.media.log().cleared, 1);
}

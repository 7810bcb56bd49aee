use std::path::Path;
use std::sync::mpsc;

use log::*;
use notify::{Event, EventKind, RecursiveMode, Watcher};

pub struct ShaderChanges {
    #[expect(unused)]
    watcher: notify::RecommendedWatcher,
    receiver: mpsc::Receiver<notify::Result<Event>>,
}

impl ShaderChanges {
    /// Drains every event since the last call; true if any compiled shader changed.
    pub fn spv_changed(&mut self) -> anyhow::Result<bool> {
        let events: notify::Result<Vec<Event>> = self.receiver.try_iter().collect();
        let changed = events?.iter().any(is_spv_change);

        Ok(changed)
    }
}

fn is_spv_change(event: &Event) -> bool {
    let relevant_kind = match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => true,
        // a removed shader can't be reloaded; wait for it to be written again
        EventKind::Remove(_) | EventKind::Access(_) => false,
        EventKind::Any | EventKind::Other => {
            warn!("unexpected notify event: {event:?}");
            false
        }
    };

    relevant_kind
        && event
            .paths
            .iter()
            .any(|path| path.extension().is_some_and(|ext| ext == "spv"))
}

pub fn watch(compiled_shaders_dir: &Path) -> notify::Result<ShaderChanges> {
    let (sender, receiver) = mpsc::channel::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(sender)?;
    watcher.watch(compiled_shaders_dir, RecursiveMode::NonRecursive)?;
    debug!("watching {compiled_shaders_dir:?} for shader changes");

    Ok(ShaderChanges { watcher, receiver })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    use super::*;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn writes_to_spv_files_count() {
        let modified = event(
            EventKind::Modify(ModifyKind::Any),
            "shaders/compiled/quad.frag.spv",
        );
        let created = event(
            EventKind::Create(CreateKind::File),
            "shaders/compiled/quad.vert.spv",
        );

        assert!(is_spv_change(&modified));
        assert!(is_spv_change(&created));
    }

    #[test]
    fn other_files_and_kinds_are_ignored() {
        assert!(!is_spv_change(&event(
            EventKind::Modify(ModifyKind::Any),
            "shaders/compiled/notes.txt"
        )));
        assert!(!is_spv_change(&event(
            EventKind::Remove(RemoveKind::File),
            "shaders/compiled/quad.vert.spv"
        )));
        assert!(!is_spv_change(&event(
            EventKind::Access(AccessKind::Any),
            "shaders/compiled/quad.vert.spv"
        )));
    }

    #[test]
    fn writes_on_disk_are_seen() {
        let dir = std::env::temp_dir().join(format!("quad-shader-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut changes = watch(&dir).unwrap();
        assert!(!changes.spv_changed().unwrap());

        std::fs::write(dir.join("quad.vert.spv"), [0u8; 4]).unwrap();

        let mut seen = false;
        for _ in 0..50 {
            if changes.spv_changed().unwrap() {
                seen = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(seen);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

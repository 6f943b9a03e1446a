//! 跨包管理器的更新汇总

use super::{Package, PackageManager};
use crate::error::{PkgError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

/// 并行查询每个可用管理器的过期包，合并、按名称去重（先到者保留）并排序。
///
/// 单个管理器失败只会让它贡献零条记录；只有一个可用管理器都没有时才返回错误。
pub fn check_updates_across(managers: &[Arc<dyn PackageManager>]) -> Result<Vec<Package>> {
    let available: Vec<&Arc<dyn PackageManager>> =
        managers.iter().filter(|m| m.is_available()).collect();
    if available.is_empty() {
        return Err(PkgError::NoManagers);
    }

    let per_manager: Vec<Vec<Package>> = thread::scope(|s| {
        let handles: Vec<_> = available
            .iter()
            .map(|m| s.spawn(move || (m.name().to_string(), m.check_outdated())))
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok((_, Ok(pkgs))) => pkgs,
                Ok((name, Err(e))) => {
                    log::warn!("{} 检查更新失败: {}", name, e);
                    Vec::new()
                }
                Err(_) => {
                    log::warn!("检查更新的线程异常退出");
                    Vec::new()
                }
            })
            .collect()
    });

    Ok(merge_outdated(per_manager))
}

/// 按管理器顺序合并，同名包只保留第一次出现的记录
pub fn merge_outdated(per_manager: Vec<Vec<Package>>) -> Vec<Package> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Package> = per_manager
        .into_iter()
        .flatten()
        .filter(|p| seen.insert(p.name.clone()))
        .collect();
    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}

/// 只保留 `tools` 中列出的包，其余静默丢弃
pub fn filter_tracked(packages: Vec<Package>, tools: &[String]) -> Vec<Package> {
    let tracked: HashSet<&str> = tools.iter().map(String::as_str).collect();
    packages
        .into_iter()
        .filter(|p| tracked.contains(p.name.as_str()))
        .collect()
}

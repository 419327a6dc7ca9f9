use crate::data::Server;

/// Order candidates by descending penalty, then ascending load.
///
/// The sort is stable, so servers that tie on both keep the directory's order.
pub fn rank_servers(servers: Vec<Server>, penalty: impl Fn(&str) -> i32) -> Vec<Server> {
    let mut scored: Vec<(i32, Server)> = servers.into_iter().map(|s| (penalty(&s.host), s)).collect();
    scored.sort_by(|(pa, a), (pb, b)| pb.cmp(pa).then(a.weighted_load.cmp(&b.weighted_load)));
    scored.into_iter().map(|(_, server)| server).collect()
}

use chrono::{Duration as ChronoDuration, Utc};

use crate::model::{ReservationWindow, Route, RouteSegment};

/// Candidate-route enumeration. Not itself part of the reservation
/// engine's core responsibility, but needed to make the Route Options
/// Handler runnable. Swappable behind a trait so a real routing service
/// can replace it.
pub trait RouteProvider: Send + Sync {
    fn generate_possible_routes(&self, origin: &str, destination: &str) -> Vec<Route>;
}

/// Enumerates simple paths over a fixed city list by DFS, exactly as
/// `original_source/api/router/route_calculator.go`'s
/// `GeneratePossibleRoutes`: origin == destination short-circuits to a
/// single one-city route with a 1-hour window; otherwise every simple
/// path from origin to destination over the complete graph of known
/// cities, converted to sequential 1-minute windows starting now.
pub struct DfsRouteProvider {
    known_cities: Vec<String>,
}

impl DfsRouteProvider {
    pub fn new(known_cities: Vec<String>) -> Self {
        Self { known_cities }
    }

    fn is_known_city(&self, city: &str) -> bool {
        self.known_cities.iter().any(|c| c == city)
    }

    fn find_all_paths_dfs(&self, origin: &str, destination: &str) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        let mut current_path = Vec::new();
        let mut visited = std::collections::HashSet::new();
        self.dfs(origin, destination, &mut current_path, &mut visited, &mut paths);
        paths
    }

    fn dfs(
        &self,
        city: &str,
        destination: &str,
        current_path: &mut Vec<String>,
        visited: &mut std::collections::HashSet<String>,
        paths: &mut Vec<Vec<String>>,
    ) {
        current_path.push(city.to_string());
        visited.insert(city.to_string());

        if city == destination {
            paths.push(current_path.clone());
        } else {
            for neighbor in &self.known_cities {
                if !visited.contains(neighbor) {
                    self.dfs(neighbor, destination, current_path, visited, paths);
                }
            }
        }

        current_path.pop();
        visited.remove(city);
    }

    fn convert_paths_to_routes(&self, paths: Vec<Vec<String>>) -> Vec<Route> {
        paths
            .into_iter()
            .filter(|path| !path.is_empty())
            .map(|path| {
                let mut current_time = Utc::now();
                path.into_iter()
                    .map(|city| {
                        let window = ReservationWindow::new(current_time, current_time + ChronoDuration::minutes(1));
                        current_time += ChronoDuration::minutes(1);
                        RouteSegment { city, window }
                    })
                    .collect::<Route>()
            })
            .collect()
    }
}

impl RouteProvider for DfsRouteProvider {
    fn generate_possible_routes(&self, origin: &str, destination: &str) -> Vec<Route> {
        if !self.is_known_city(origin) || !self.is_known_city(destination) {
            log::info!("routing: origin '{}' or destination '{}' not in known city list", origin, destination);
            return Vec::new();
        }

        if origin == destination {
            let now = Utc::now();
            let window = ReservationWindow::new(now, now + ChronoDuration::hours(1));
            return vec![vec![RouteSegment { city: origin.to_string(), window }]];
        }

        let paths = self.find_all_paths_dfs(origin, destination);
        if paths.is_empty() {
            log::info!("routing: no DFS path found between '{}' and '{}'", origin, destination);
        }
        self.convert_paths_to_routes(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_city_yields_single_one_hour_segment() {
        let provider = DfsRouteProvider::new(vec!["Salvador".into()]);
        let routes = provider.generate_possible_routes("Salvador", "Salvador");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].len(), 1);
        let window = routes[0][0].window;
        assert_eq!((window.end - window.start).num_minutes(), 60);
    }

    #[test]
    fn unknown_city_yields_no_routes() {
        let provider = DfsRouteProvider::new(vec!["Salvador".into(), "Ilheus".into()]);
        assert!(provider.generate_possible_routes("Salvador", "Feira de Santana").is_empty());
    }

    #[test]
    fn two_city_route_has_sequential_windows() {
        let provider = DfsRouteProvider::new(vec!["Salvador".into(), "Ilheus".into()]);
        let routes = provider.generate_possible_routes("Salvador", "Ilheus");
        assert_eq!(routes.len(), 1);
        let route = &routes[0];
        assert_eq!(route.len(), 2);
        assert_eq!(route[0].city, "Salvador");
        assert_eq!(route[1].city, "Ilheus");
        assert!(route[1].window.start >= route[0].window.end);
    }
}

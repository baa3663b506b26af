//! Console command builders for the operations chat frontends expose.
//!
//! Only teleport needs building today; other commands are passed through as typed.

/// Where a teleported player should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Coordinates { x: i64, y: i64, z: i64 },
    Player(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeleportError {
    MissingPlayer,
    /// Neither a target player nor all three coordinates were supplied.
    MissingDestination,
}

impl std::fmt::Display for TeleportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeleportError::MissingPlayer => {
                write!(f, "no player name provided, cannot teleport")
            }
            TeleportError::MissingDestination => {
                write!(f, "provide X Y Z coordinates or a target player")
            }
        }
    }
}

impl std::error::Error for TeleportError {}

/// Resolve the optional destination fields. A target player wins over coordinates.
pub fn resolve_destination(
    target: Option<&str>,
    coords: (Option<i64>, Option<i64>, Option<i64>),
) -> Result<Destination, TeleportError> {
    if let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(Destination::Player(target.to_string()));
    }
    match coords {
        (Some(x), Some(y), Some(z)) => Ok(Destination::Coordinates { x, y, z }),
        _ => Err(TeleportError::MissingDestination),
    }
}

/// `execute as <player> run teleport @s <destination>`
pub fn teleport(player: &str, destination: &Destination) -> Result<String, TeleportError> {
    let player = player.trim();
    if player.is_empty() {
        return Err(TeleportError::MissingPlayer);
    }
    let dest = match destination {
        Destination::Coordinates { x, y, z } => format!("{x} {y} {z}"),
        Destination::Player(target) => target.clone(),
    };
    Ok(format!("execute as {player} run teleport @s {dest}"))
}

/// Parse console shorthand: `<player> <x> <y> <z>` or `<player> <target>`.
pub fn parse_teleport_args(args: &str) -> Result<String, TeleportError> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let Some((player, rest)) = parts.split_first() else {
        return Err(TeleportError::MissingPlayer);
    };
    let destination = match rest {
        [target] => resolve_destination(Some(*target), (None, None, None))?,
        [x, y, z] => resolve_destination(
            None,
            (x.parse().ok(), y.parse().ok(), z.parse().ok()),
        )?,
        _ => return Err(TeleportError::MissingDestination),
    };
    teleport(player, &destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teleport_to_coordinates() {
        let dest = Destination::Coordinates {
            x: 100,
            y: 64,
            z: -20,
        };
        assert_eq!(
            teleport("Steve", &dest).unwrap(),
            "execute as Steve run teleport @s 100 64 -20"
        );
    }

    #[test]
    fn test_teleport_to_player() {
        let dest = Destination::Player("Alex".to_string());
        assert_eq!(
            teleport("Steve", &dest).unwrap(),
            "execute as Steve run teleport @s Alex"
        );
    }

    #[test]
    fn test_teleport_blank_player_rejected() {
        let dest = Destination::Player("Alex".to_string());
        assert_eq!(teleport("  ", &dest), Err(TeleportError::MissingPlayer));
    }

    #[test]
    fn test_target_wins_over_coordinates() {
        let dest = resolve_destination(Some("Alex"), (Some(1), Some(2), Some(3))).unwrap();
        assert_eq!(dest, Destination::Player("Alex".to_string()));
    }

    #[test]
    fn test_partial_coordinates_rejected() {
        assert_eq!(
            resolve_destination(None, (Some(1), None, Some(3))),
            Err(TeleportError::MissingDestination)
        );
        assert_eq!(
            resolve_destination(Some(" "), (None, None, None)),
            Err(TeleportError::MissingDestination)
        );
    }

    #[test]
    fn test_zero_coordinates_accepted() {
        let dest = resolve_destination(None, (Some(0), Some(0), Some(0))).unwrap();
        assert_eq!(dest, Destination::Coordinates { x: 0, y: 0, z: 0 });
    }

    #[test]
    fn test_parse_shorthand() {
        assert_eq!(
            parse_teleport_args("Steve 10 70 -5").unwrap(),
            "execute as Steve run teleport @s 10 70 -5"
        );
        assert_eq!(
            parse_teleport_args("Steve Alex").unwrap(),
            "execute as Steve run teleport @s Alex"
        );
        assert_eq!(parse_teleport_args(""), Err(TeleportError::MissingPlayer));
        assert_eq!(
            parse_teleport_args("Steve 10 seventy -5"),
            Err(TeleportError::MissingDestination)
        );
        assert_eq!(
            parse_teleport_args("Steve 10 70"),
            Err(TeleportError::MissingDestination)
        );
    }
}

/// 2D点（ピクセル座標）
pub type Point = (f32, f32);

/// 点 b を頂点とし、b→a と b→c がなす角度（度、0〜180）
///
/// どちらかのベクトル長が0なら0を返す。
pub fn angle_at(a: Point, b: Point, c: Point) -> f32 {
    let ba = (a.0 - b.0, a.1 - b.1);
    let bc = (c.0 - b.0, c.1 - b.1);

    let dot = ba.0 * bc.0 + ba.1 * bc.1;
    let magnitude = (ba.0 * ba.0 + ba.1 * ba.1).sqrt() * (bc.0 * bc.0 + bc.1 * bc.1).sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }

    // 丸め誤差で ±1 をわずかに超えると acos が NaN になる
    let cos = (dot / magnitude).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_straight_line_is_180() {
        assert!(approx_eq(angle_at((0.0, 0.0), (5.0, 5.0), (10.0, 10.0)), 180.0));
        assert!(approx_eq(angle_at((-3.0, 0.0), (0.0, 0.0), (3.0, 0.0)), 180.0));
        assert!(approx_eq(angle_at((100.0, 40.0), (100.0, 240.0), (100.0, 440.0)), 180.0));
    }

    #[test]
    fn test_right_angle() {
        assert!(approx_eq(angle_at((1.0, 0.0), (0.0, 0.0), (0.0, 1.0)), 90.0));
    }

    #[test]
    fn test_same_direction_is_zero() {
        assert!(approx_eq(angle_at((2.0, 0.0), (0.0, 0.0), (5.0, 0.0)), 0.0));
    }

    #[test]
    fn test_degenerate_rays_return_zero() {
        assert_eq!(angle_at((1.0, 1.0), (1.0, 1.0), (4.0, 2.0)), 0.0);
        assert_eq!(angle_at((4.0, 2.0), (1.0, 1.0), (1.0, 1.0)), 0.0);
        assert_eq!(angle_at((1.0, 1.0), (1.0, 1.0), (1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_result_stays_in_range() {
        let points = [(0.0, 0.0), (640.0, 0.0), (320.0, 480.0), (13.0, 7.0), (-50.0, 90.0)];
        for a in points {
            for b in points {
                for c in points {
                    let angle = angle_at(a, b, c);
                    assert!((0.0..=180.0).contains(&angle), "{:?} {:?} {:?} -> {}", a, b, c, angle);
                }
            }
        }
    }
}

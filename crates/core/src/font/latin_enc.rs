//! Latin character set and encodings (PDF 32000 Annex D.2).

/// One glyph: (name, unicode, StandardEncoding, MacRomanEncoding,
/// WinAnsiEncoding, PDFDocEncoding).
pub type LatinGlyph = (&'static str, char, Option<u8>, Option<u8>, Option<u8>, Option<u8>);

pub const LATIN_GLYPHS: &[LatinGlyph] = &[
    ("A", 'A', Some(65), Some(65), Some(65), Some(65)),
    ("AE", '\u{00c6}', Some(225), Some(174), Some(198), Some(198)),
    ("Aacute", '\u{00c1}', None, Some(231), Some(193), Some(193)),
    ("Acircumflex", '\u{00c2}', None, Some(229), Some(194), Some(194)),
    ("Adieresis", '\u{00c4}', None, Some(128), Some(196), Some(196)),
    ("Agrave", '\u{00c0}', None, Some(203), Some(192), Some(192)),
    ("Aring", '\u{00c5}', None, Some(129), Some(197), Some(197)),
    ("Atilde", '\u{00c3}', None, Some(204), Some(195), Some(195)),
    ("B", 'B', Some(66), Some(66), Some(66), Some(66)),
    ("C", 'C', Some(67), Some(67), Some(67), Some(67)),
    ("Ccedilla", '\u{00c7}', None, Some(130), Some(199), Some(199)),
    ("D", 'D', Some(68), Some(68), Some(68), Some(68)),
    ("E", 'E', Some(69), Some(69), Some(69), Some(69)),
    ("Eacute", '\u{00c9}', None, Some(131), Some(201), Some(201)),
    ("Ecircumflex", '\u{00ca}', None, Some(230), Some(202), Some(202)),
    ("Edieresis", '\u{00cb}', None, Some(232), Some(203), Some(203)),
    ("Egrave", '\u{00c8}', None, Some(233), Some(200), Some(200)),
    ("Eth", '\u{00d0}', None, None, Some(208), Some(208)),
    ("Euro", '\u{20ac}', None, None, Some(128), Some(160)),
    ("F", 'F', Some(70), Some(70), Some(70), Some(70)),
    ("G", 'G', Some(71), Some(71), Some(71), Some(71)),
    ("H", 'H', Some(72), Some(72), Some(72), Some(72)),
    ("I", 'I', Some(73), Some(73), Some(73), Some(73)),
    ("Iacute", '\u{00cd}', None, Some(234), Some(205), Some(205)),
    ("Icircumflex", '\u{00ce}', None, Some(235), Some(206), Some(206)),
    ("Idieresis", '\u{00cf}', None, Some(236), Some(207), Some(207)),
    ("Igrave", '\u{00cc}', None, Some(237), Some(204), Some(204)),
    ("J", 'J', Some(74), Some(74), Some(74), Some(74)),
    ("K", 'K', Some(75), Some(75), Some(75), Some(75)),
    ("L", 'L', Some(76), Some(76), Some(76), Some(76)),
    ("Lslash", '\u{0141}', Some(232), None, None, Some(149)),
    ("M", 'M', Some(77), Some(77), Some(77), Some(77)),
    ("N", 'N', Some(78), Some(78), Some(78), Some(78)),
    ("Ntilde", '\u{00d1}', None, Some(132), Some(209), Some(209)),
    ("O", 'O', Some(79), Some(79), Some(79), Some(79)),
    ("OE", '\u{0152}', Some(234), Some(206), Some(140), Some(150)),
    ("Oacute", '\u{00d3}', None, Some(238), Some(211), Some(211)),
    ("Ocircumflex", '\u{00d4}', None, Some(239), Some(212), Some(212)),
    ("Odieresis", '\u{00d6}', None, Some(133), Some(214), Some(214)),
    ("Ograve", '\u{00d2}', None, Some(241), Some(210), Some(210)),
    ("Oslash", '\u{00d8}', Some(233), Some(175), Some(216), Some(216)),
    ("Otilde", '\u{00d5}', None, Some(205), Some(213), Some(213)),
    ("P", 'P', Some(80), Some(80), Some(80), Some(80)),
    ("Q", 'Q', Some(81), Some(81), Some(81), Some(81)),
    ("R", 'R', Some(82), Some(82), Some(82), Some(82)),
    ("S", 'S', Some(83), Some(83), Some(83), Some(83)),
    ("Scaron", '\u{0160}', None, None, Some(138), Some(151)),
    ("T", 'T', Some(84), Some(84), Some(84), Some(84)),
    ("Thorn", '\u{00de}', None, None, Some(222), Some(222)),
    ("U", 'U', Some(85), Some(85), Some(85), Some(85)),
    ("Uacute", '\u{00da}', None, Some(242), Some(218), Some(218)),
    ("Ucircumflex", '\u{00db}', None, Some(243), Some(219), Some(219)),
    ("Udieresis", '\u{00dc}', None, Some(134), Some(220), Some(220)),
    ("Ugrave", '\u{00d9}', None, Some(244), Some(217), Some(217)),
    ("V", 'V', Some(86), Some(86), Some(86), Some(86)),
    ("W", 'W', Some(87), Some(87), Some(87), Some(87)),
    ("X", 'X', Some(88), Some(88), Some(88), Some(88)),
    ("Y", 'Y', Some(89), Some(89), Some(89), Some(89)),
    ("Yacute", '\u{00dd}', None, None, Some(221), Some(221)),
    ("Ydieresis", '\u{0178}', None, Some(217), Some(159), Some(152)),
    ("Z", 'Z', Some(90), Some(90), Some(90), Some(90)),
    ("Zcaron", '\u{017d}', None, None, Some(142), Some(153)),
    ("a", 'a', Some(97), Some(97), Some(97), Some(97)),
    ("aacute", '\u{00e1}', None, Some(135), Some(225), Some(225)),
    ("acircumflex", '\u{00e2}', None, Some(137), Some(226), Some(226)),
    ("acute", '\u{00b4}', Some(194), Some(171), Some(180), Some(180)),
    ("adieresis", '\u{00e4}', None, Some(138), Some(228), Some(228)),
    ("ae", '\u{00e6}', Some(241), Some(190), Some(230), Some(230)),
    ("agrave", '\u{00e0}', None, Some(136), Some(224), Some(224)),
    ("ampersand", '&', Some(38), Some(38), Some(38), Some(38)),
    ("aring", '\u{00e5}', None, Some(140), Some(229), Some(229)),
    ("asciicircum", '^', Some(94), Some(94), Some(94), Some(94)),
    ("asciitilde", '~', Some(126), Some(126), Some(126), Some(126)),
    ("asterisk", '*', Some(42), Some(42), Some(42), Some(42)),
    ("at", '@', Some(64), Some(64), Some(64), Some(64)),
    ("atilde", '\u{00e3}', None, Some(139), Some(227), Some(227)),
    ("b", 'b', Some(98), Some(98), Some(98), Some(98)),
    ("backslash", '\\', Some(92), Some(92), Some(92), Some(92)),
    ("bar", '|', Some(124), Some(124), Some(124), Some(124)),
    ("braceleft", '{', Some(123), Some(123), Some(123), Some(123)),
    ("braceright", '}', Some(125), Some(125), Some(125), Some(125)),
    ("bracketleft", '[', Some(91), Some(91), Some(91), Some(91)),
    ("bracketright", ']', Some(93), Some(93), Some(93), Some(93)),
    ("breve", '\u{02d8}', Some(198), Some(249), None, Some(24)),
    ("brokenbar", '\u{00a6}', None, None, Some(166), Some(166)),
    ("bullet", '\u{2022}', Some(183), Some(165), Some(149), Some(128)),
    ("c", 'c', Some(99), Some(99), Some(99), Some(99)),
    ("caron", '\u{02c7}', Some(207), Some(255), None, Some(25)),
    ("ccedilla", '\u{00e7}', None, Some(141), Some(231), Some(231)),
    ("cedilla", '\u{00b8}', Some(203), Some(252), Some(184), Some(184)),
    ("cent", '\u{00a2}', Some(162), Some(162), Some(162), Some(162)),
    ("circumflex", '\u{02c6}', Some(195), Some(246), Some(136), Some(26)),
    ("colon", ':', Some(58), Some(58), Some(58), Some(58)),
    ("comma", ',', Some(44), Some(44), Some(44), Some(44)),
    ("copyright", '\u{00a9}', None, Some(169), Some(169), Some(169)),
    ("currency", '\u{00a4}', Some(168), Some(219), Some(164), Some(164)),
    ("d", 'd', Some(100), Some(100), Some(100), Some(100)),
    ("dagger", '\u{2020}', Some(178), Some(160), Some(134), Some(129)),
    ("daggerdbl", '\u{2021}', Some(179), Some(224), Some(135), Some(130)),
    ("degree", '\u{00b0}', None, Some(161), Some(176), Some(176)),
    ("dieresis", '\u{00a8}', Some(200), Some(172), Some(168), Some(168)),
    ("divide", '\u{00f7}', None, Some(214), Some(247), Some(247)),
    ("dollar", '$', Some(36), Some(36), Some(36), Some(36)),
    ("dotaccent", '\u{02d9}', Some(199), Some(250), None, Some(27)),
    ("dotlessi", '\u{0131}', Some(245), Some(245), None, Some(154)),
    ("e", 'e', Some(101), Some(101), Some(101), Some(101)),
    ("eacute", '\u{00e9}', None, Some(142), Some(233), Some(233)),
    ("ecircumflex", '\u{00ea}', None, Some(144), Some(234), Some(234)),
    ("edieresis", '\u{00eb}', None, Some(145), Some(235), Some(235)),
    ("egrave", '\u{00e8}', None, Some(143), Some(232), Some(232)),
    ("eight", '8', Some(56), Some(56), Some(56), Some(56)),
    ("ellipsis", '\u{2026}', Some(188), Some(201), Some(133), Some(131)),
    ("emdash", '\u{2014}', Some(208), Some(209), Some(151), Some(132)),
    ("endash", '\u{2013}', Some(177), Some(208), Some(150), Some(133)),
    ("equal", '=', Some(61), Some(61), Some(61), Some(61)),
    ("eth", '\u{00f0}', None, None, Some(240), Some(240)),
    ("exclam", '!', Some(33), Some(33), Some(33), Some(33)),
    ("exclamdown", '\u{00a1}', Some(161), Some(193), Some(161), Some(161)),
    ("f", 'f', Some(102), Some(102), Some(102), Some(102)),
    ("fi", '\u{fb01}', Some(174), Some(222), None, Some(147)),
    ("five", '5', Some(53), Some(53), Some(53), Some(53)),
    ("fl", '\u{fb02}', Some(175), Some(223), None, Some(148)),
    ("florin", '\u{0192}', Some(166), Some(196), Some(131), Some(134)),
    ("four", '4', Some(52), Some(52), Some(52), Some(52)),
    ("fraction", '\u{2044}', Some(164), Some(218), None, Some(135)),
    ("g", 'g', Some(103), Some(103), Some(103), Some(103)),
    ("germandbls", '\u{00df}', Some(251), Some(167), Some(223), Some(223)),
    ("grave", '`', Some(193), Some(96), Some(96), Some(96)),
    ("greater", '>', Some(62), Some(62), Some(62), Some(62)),
    ("guillemotleft", '\u{00ab}', Some(171), Some(199), Some(171), Some(171)),
    ("guillemotright", '\u{00bb}', Some(187), Some(200), Some(187), Some(187)),
    ("guilsinglleft", '\u{2039}', Some(172), Some(220), Some(139), Some(136)),
    ("guilsinglright", '\u{203a}', Some(173), Some(221), Some(155), Some(137)),
    ("h", 'h', Some(104), Some(104), Some(104), Some(104)),
    ("hungarumlaut", '\u{02dd}', Some(205), Some(253), None, Some(28)),
    ("hyphen", '-', Some(45), Some(45), Some(45), Some(45)),
    ("i", 'i', Some(105), Some(105), Some(105), Some(105)),
    ("iacute", '\u{00ed}', None, Some(146), Some(237), Some(237)),
    ("icircumflex", '\u{00ee}', None, Some(148), Some(238), Some(238)),
    ("idieresis", '\u{00ef}', None, Some(149), Some(239), Some(239)),
    ("igrave", '\u{00ec}', None, Some(147), Some(236), Some(236)),
    ("j", 'j', Some(106), Some(106), Some(106), Some(106)),
    ("k", 'k', Some(107), Some(107), Some(107), Some(107)),
    ("l", 'l', Some(108), Some(108), Some(108), Some(108)),
    ("less", '<', Some(60), Some(60), Some(60), Some(60)),
    ("logicalnot", '\u{00ac}', None, Some(194), Some(172), Some(172)),
    ("lslash", '\u{0142}', Some(248), None, None, Some(155)),
    ("m", 'm', Some(109), Some(109), Some(109), Some(109)),
    ("macron", '\u{00af}', Some(197), Some(248), Some(175), Some(175)),
    ("minus", '\u{2212}', None, None, None, Some(138)),
    ("mu", '\u{00b5}', None, Some(181), Some(181), Some(181)),
    ("multiply", '\u{00d7}', None, None, Some(215), Some(215)),
    ("n", 'n', Some(110), Some(110), Some(110), Some(110)),
    ("nbspace", '\u{00a0}', None, Some(202), Some(160), None),
    ("nine", '9', Some(57), Some(57), Some(57), Some(57)),
    ("ntilde", '\u{00f1}', None, Some(150), Some(241), Some(241)),
    ("numbersign", '#', Some(35), Some(35), Some(35), Some(35)),
    ("o", 'o', Some(111), Some(111), Some(111), Some(111)),
    ("oacute", '\u{00f3}', None, Some(151), Some(243), Some(243)),
    ("ocircumflex", '\u{00f4}', None, Some(153), Some(244), Some(244)),
    ("odieresis", '\u{00f6}', None, Some(154), Some(246), Some(246)),
    ("oe", '\u{0153}', Some(250), Some(207), Some(156), Some(156)),
    ("ogonek", '\u{02db}', Some(206), Some(254), None, Some(29)),
    ("ograve", '\u{00f2}', None, Some(152), Some(242), Some(242)),
    ("one", '1', Some(49), Some(49), Some(49), Some(49)),
    ("onehalf", '\u{00bd}', None, None, Some(189), Some(189)),
    ("onequarter", '\u{00bc}', None, None, Some(188), Some(188)),
    ("onesuperior", '\u{00b9}', None, None, Some(185), Some(185)),
    ("ordfeminine", '\u{00aa}', Some(227), Some(187), Some(170), Some(170)),
    ("ordmasculine", '\u{00ba}', Some(235), Some(188), Some(186), Some(186)),
    ("oslash", '\u{00f8}', Some(249), Some(191), Some(248), Some(248)),
    ("otilde", '\u{00f5}', None, Some(155), Some(245), Some(245)),
    ("p", 'p', Some(112), Some(112), Some(112), Some(112)),
    ("paragraph", '\u{00b6}', Some(182), Some(166), Some(182), Some(182)),
    ("parenleft", '(', Some(40), Some(40), Some(40), Some(40)),
    ("parenright", ')', Some(41), Some(41), Some(41), Some(41)),
    ("percent", '%', Some(37), Some(37), Some(37), Some(37)),
    ("period", '.', Some(46), Some(46), Some(46), Some(46)),
    ("periodcentered", '\u{00b7}', Some(180), Some(225), Some(183), Some(183)),
    ("perthousand", '\u{2030}', Some(189), Some(228), Some(137), Some(139)),
    ("plus", '+', Some(43), Some(43), Some(43), Some(43)),
    ("plusminus", '\u{00b1}', None, Some(177), Some(177), Some(177)),
    ("q", 'q', Some(113), Some(113), Some(113), Some(113)),
    ("question", '?', Some(63), Some(63), Some(63), Some(63)),
    ("questiondown", '\u{00bf}', Some(191), Some(192), Some(191), Some(191)),
    ("quotedbl", '"', Some(34), Some(34), Some(34), Some(34)),
    ("quotedblbase", '\u{201e}', Some(185), Some(227), Some(132), Some(140)),
    ("quotedblleft", '\u{201c}', Some(170), Some(210), Some(147), Some(141)),
    ("quotedblright", '\u{201d}', Some(186), Some(211), Some(148), Some(142)),
    ("quoteleft", '\u{2018}', Some(96), Some(212), Some(145), Some(143)),
    ("quoteright", '\u{2019}', Some(39), Some(213), Some(146), Some(144)),
    ("quotesinglbase", '\u{201a}', Some(184), Some(226), Some(130), Some(145)),
    ("quotesingle", '\'', Some(169), Some(39), Some(39), Some(39)),
    ("r", 'r', Some(114), Some(114), Some(114), Some(114)),
    ("registered", '\u{00ae}', None, Some(168), Some(174), Some(174)),
    ("ring", '\u{02da}', Some(202), Some(251), None, Some(30)),
    ("s", 's', Some(115), Some(115), Some(115), Some(115)),
    ("scaron", '\u{0161}', None, None, Some(154), Some(157)),
    ("section", '\u{00a7}', Some(167), Some(164), Some(167), Some(167)),
    ("semicolon", ';', Some(59), Some(59), Some(59), Some(59)),
    ("seven", '7', Some(55), Some(55), Some(55), Some(55)),
    ("six", '6', Some(54), Some(54), Some(54), Some(54)),
    ("slash", '/', Some(47), Some(47), Some(47), Some(47)),
    ("space", ' ', Some(32), Some(32), Some(32), Some(32)),
    ("space", ' ', None, Some(202), Some(160), None),
    ("space", ' ', None, Some(202), Some(173), None),
    ("sterling", '\u{00a3}', Some(163), Some(163), Some(163), Some(163)),
    ("t", 't', Some(116), Some(116), Some(116), Some(116)),
    ("thorn", '\u{00fe}', None, None, Some(254), Some(254)),
    ("three", '3', Some(51), Some(51), Some(51), Some(51)),
    ("threequarters", '\u{00be}', None, None, Some(190), Some(190)),
    ("threesuperior", '\u{00b3}', None, None, Some(179), Some(179)),
    ("tilde", '\u{02dc}', Some(196), Some(247), Some(152), Some(31)),
    ("trademark", '\u{2122}', None, Some(170), Some(153), Some(146)),
    ("two", '2', Some(50), Some(50), Some(50), Some(50)),
    ("twosuperior", '\u{00b2}', None, None, Some(178), Some(178)),
    ("u", 'u', Some(117), Some(117), Some(117), Some(117)),
    ("uacute", '\u{00fa}', None, Some(156), Some(250), Some(250)),
    ("ucircumflex", '\u{00fb}', None, Some(158), Some(251), Some(251)),
    ("udieresis", '\u{00fc}', None, Some(159), Some(252), Some(252)),
    ("ugrave", '\u{00f9}', None, Some(157), Some(249), Some(249)),
    ("underscore", '_', Some(95), Some(95), Some(95), Some(95)),
    ("v", 'v', Some(118), Some(118), Some(118), Some(118)),
    ("w", 'w', Some(119), Some(119), Some(119), Some(119)),
    ("x", 'x', Some(120), Some(120), Some(120), Some(120)),
    ("y", 'y', Some(121), Some(121), Some(121), Some(121)),
    ("yacute", '\u{00fd}', None, None, Some(253), Some(253)),
    ("ydieresis", '\u{00ff}', None, Some(216), Some(255), Some(255)),
    ("yen", '\u{00a5}', Some(165), Some(180), Some(165), Some(165)),
    ("z", 'z', Some(122), Some(122), Some(122), Some(122)),
    ("zcaron", '\u{017e}', None, None, Some(158), Some(158)),
    ("zero", '0', Some(48), Some(48), Some(48), Some(48)),
];
